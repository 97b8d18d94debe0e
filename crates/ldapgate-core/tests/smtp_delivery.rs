//! End-to-end delivery through [`SmtpMailer`] against a loopback relay that
//! performs a real STARTTLS handshake with a self-signed certificate.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use ldapgate_core::{
    AccountRequest, DeliveryError, DeliveryErrorKind, DeliveryStage, MailConfig, MailTransport,
    NotificationMessage, SmtpMailer,
};
use ldapgate_smtp::connection::install_crypto_provider;
use ldapgate_smtp::{Address, Timeouts};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use secrecy::Secret;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// `\0svc\0pw` in base64.
const AUTH_LINE: &str = "AUTH PLAIN AHN2YwBwdw==";

struct Relay {
    port: u16,
    connector: TlsConnector,
    received: JoinHandle<Vec<String>>,
}

/// How the relay answers once the session is encrypted.
#[derive(Clone, Copy)]
struct Script {
    ehlo: &'static str,
    auth: &'static str,
}

const ACCEPTING: Script = Script {
    ehlo: "250-relay.test\r\n250 AUTH PLAIN\r\n",
    auth: "235 2.7.0 accepted\r\n",
};

fn tls_pair() -> (TlsAcceptor, TlsConnector) {
    install_crypto_provider();

    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let server = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let client = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (
        TlsAcceptor::from(Arc::new(server)),
        TlsConnector::from(Arc::new(client)),
    )
}

async fn relay(script: Script) -> Relay {
    let (acceptor, connector) = tls_pair();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let received = tokio::spawn(async move {
        let mut received = Vec::new();
        let (socket, _) = listener.accept().await.unwrap();
        let mut plain = BufReader::new(socket);

        reply(&mut plain, "220 relay.test ESMTP\r\n").await;
        loop {
            let Some(line) = next_line(&mut plain).await else {
                return received;
            };
            let upgrade = line == "STARTTLS";
            let answer = if upgrade {
                "220 2.0.0 go ahead\r\n"
            } else {
                "250-relay.test\r\n250-STARTTLS\r\n250 AUTH PLAIN\r\n"
            };
            received.push(line);
            reply(&mut plain, answer).await;
            if upgrade {
                break;
            }
        }

        let tls = acceptor.accept(plain.into_inner()).await.unwrap();
        serve_secured(BufReader::new(tls), script, &mut received).await;
        received
    });

    Relay {
        port,
        connector,
        received,
    }
}

async fn serve_secured<S>(mut stream: BufReader<S>, script: Script, received: &mut Vec<String>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = next_line(&mut stream).await {
        let verb = line.split([' ', ':']).next().unwrap_or_default().to_string();
        received.push(line);
        match verb.as_str() {
            "EHLO" => reply(&mut stream, script.ehlo).await,
            "AUTH" => reply(&mut stream, script.auth).await,
            "DATA" => {
                reply(&mut stream, "354 end with .\r\n").await;
                while let Some(data) = next_line(&mut stream).await {
                    let done = data == ".";
                    received.push(data);
                    if done {
                        break;
                    }
                }
                reply(&mut stream, "250 2.0.0 queued\r\n").await;
            }
            "QUIT" => {
                reply(&mut stream, "221 bye\r\n").await;
                return;
            }
            _ => reply(&mut stream, "250 ok\r\n").await,
        }
    }
}

async fn next_line<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut BufReader<S>) -> Option<String> {
    let mut line = String::new();
    match stream.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

async fn reply<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut BufReader<S>, text: &str) {
    let inner = stream.get_mut();
    inner.write_all(text.as_bytes()).await.unwrap();
    inner.flush().await.unwrap();
}

fn mailer(relay: &Relay) -> SmtpMailer {
    let config = MailConfig {
        host: "localhost".to_string(),
        port: relay.port,
        username: "svc".to_string(),
        password: Secret::new("pw".to_string()),
        helo_name: "gateway.test".to_string(),
        sender: Address::new("noreply@example.com").unwrap(),
        recipient: Address::new("admin@example.com").unwrap(),
        timeouts: Timeouts {
            connect: Duration::from_secs(2),
            io: Duration::from_secs(2),
        },
    };
    SmtpMailer::with_connector(config, relay.connector.clone())
}

fn notification(username: &str) -> NotificationMessage {
    let request = AccountRequest::new(username, "alice@example.com").unwrap();
    NotificationMessage::compose(&request, "noreply@example.com", "admin@example.com")
}

#[tokio::test]
async fn delivers_over_starttls_with_auth_plain() {
    let relay = relay(ACCEPTING).await;

    mailer(&relay).notify(&notification("alice")).await.unwrap();

    let received = relay.received.await.unwrap();
    let envelope: Vec<&str> = received
        .iter()
        .map(String::as_str)
        .filter(|line| {
            ["EHLO", "STARTTLS", "AUTH", "MAIL", "RCPT", "DATA", "QUIT"]
                .iter()
                .any(|verb| line.starts_with(verb))
        })
        .collect();
    assert_eq!(
        envelope,
        [
            "EHLO gateway.test",
            "STARTTLS",
            "EHLO gateway.test",
            AUTH_LINE,
            "MAIL FROM:<noreply@example.com>",
            "RCPT TO:<admin@example.com>",
            "DATA",
            "QUIT",
        ]
    );
    assert!(received.iter().any(|line| line == "Subject: New Account Request!"));
    assert!(received.iter().any(|line| line == "Content-Transfer-Encoding: 7bit"));
    assert!(received.iter().any(|line| line == "Username: alice"));
    assert!(received.iter().any(|line| line == "Email: alice@example.com"));

    let dot = received.iter().position(|line| line == ".").unwrap();
    assert_eq!(received[dot + 1], "QUIT");
}

#[tokio::test]
async fn body_lines_starting_with_a_dot_are_stuffed() {
    let relay = relay(ACCEPTING).await;
    let mut message = notification("alice");
    message.body = ".signature\n.\nend".to_string();

    mailer(&relay).notify(&message).await.unwrap();

    let received = relay.received.await.unwrap();
    assert!(received.iter().any(|line| line == "..signature"));
    assert!(received.iter().any(|line| line == ".."));
    assert!(!received.iter().any(|line| line == ".signature"));
    assert_eq!(received.iter().filter(|line| *line == ".").count(), 1);
}

#[tokio::test]
async fn rejected_credentials_fail_at_authenticate() {
    let relay = relay(Script {
        auth: "535 5.7.8 credentials invalid\r\n",
        ..ACCEPTING
    })
    .await;

    let err = mailer(&relay).notify(&notification("alice")).await.unwrap_err();

    assert_eq!(
        err,
        DeliveryError::new(
            DeliveryStage::Authenticate,
            DeliveryErrorKind::Rejected { code: 535 }
        )
    );
    let received = relay.received.await.unwrap();
    assert!(received.iter().any(|line| line == AUTH_LINE));
    assert!(!received.iter().any(|line| line.starts_with("MAIL")));
    assert_eq!(received.last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn non_ascii_body_uses_eight_bit_when_advertised() {
    let relay = relay(Script {
        ehlo: "250-relay.test\r\n250-8BITMIME\r\n250 AUTH PLAIN\r\n",
        ..ACCEPTING
    })
    .await;

    mailer(&relay).notify(&notification("Zoë")).await.unwrap();

    let received = relay.received.await.unwrap();
    assert!(received.iter().any(|line| line == "MAIL FROM:<noreply@example.com> BODY=8BITMIME"));
    assert!(received.iter().any(|line| line == "Content-Transfer-Encoding: 8bit"));
    assert!(received.iter().any(|line| line == "Username: Zoë"));
}

#[tokio::test]
async fn non_ascii_body_is_quoted_printable_without_eight_bit() {
    let relay = relay(ACCEPTING).await;

    mailer(&relay).notify(&notification("Zoë")).await.unwrap();

    let received = relay.received.await.unwrap();
    assert!(received.iter().any(|line| line == "MAIL FROM:<noreply@example.com>"));
    assert!(received.iter().any(|line| line == "Content-Transfer-Encoding: quoted-printable"));
    assert!(received.iter().any(|line| line == "Username: Zo=C3=AB"));
}
