use std::time::Duration;

use market_data_ingestor::providers::{
    ProviderError, ProviderInitError, QuoteProvider,
    finnhub::{API_KEY_ENV, DEFAULT_BASE_URL, FinnhubProvider},
};
use secrecy::SecretString;
use serial_test::serial;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

struct Canned {
    status: u16,
    body: &'static str,
    headers: Vec<(&'static str, &'static str)>,
}

fn canned(status: u16, body: &'static str) -> Canned {
    Canned {
        status,
        body,
        headers: vec![],
    }
}

/// One-connection-per-response HTTP stub; returns the raw requests it saw.
async fn serve(responses: Vec<Canned>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for resp in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut read = 0;
            loop {
                let n = sock.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            seen.push(String::from_utf8_lossy(&buf[..read]).to_string());

            let mut out = format!(
                "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                resp.status,
                resp.body.len()
            );
            for (k, v) in resp.headers {
                out.push_str(&format!("{k}: {v}\r\n"));
            }
            out.push_str("\r\n");
            out.push_str(resp.body);
            sock.write_all(out.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        }
        seen
    });

    (format!("http://{addr}"), handle)
}

fn provider(base_url: &str) -> FinnhubProvider {
    FinnhubProvider::new(
        SecretString::new("test-key".into()),
        base_url,
        Duration::from_secs(5),
    )
    .expect("provider")
}

#[tokio::test]
async fn quote_request_carries_symbol_and_token() {
    let (url, server) = serve(vec![canned(
        200,
        r#"{"c":187.5,"d":1.5,"dp":0.8,"h":188,"l":185,"o":186,"pc":186,"t":1700000000}"#,
    )])
    .await;

    let quote = provider(&url).fetch_quote("AAPL").await.expect("quote");
    assert_eq!(quote.current.to_string(), "187.5");
    assert_eq!(quote.previous_close.map(|d| d.to_string()).as_deref(), Some("186"));

    let requests = server.await.unwrap();
    let req = requests[0].to_lowercase();
    assert!(req.starts_with("get /quote?symbol=aapl "), "{req}");
    assert!(req.contains("x-finnhub-token: test-key"), "{req}");
}

#[tokio::test]
async fn profile_and_metric_paths() {
    let (url, server) = serve(vec![
        canned(200, r#"{"name":"Apple Inc","finnhubIndustry":"Technology"}"#),
        canned(200, r#"{"metric":{"marketCapitalization":3000000},"symbol":"AAPL"}"#),
    ])
    .await;
    let p = provider(&url);

    let profile = p.fetch_profile("AAPL").await.expect("profile");
    assert_eq!(profile.sector.as_deref(), Some("Technology"));
    let fin = p.fetch_basic_financials("AAPL").await.expect("metric");
    assert_eq!(fin.market_cap, Some(3_000_000_000_000));

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("GET /stock/profile2?symbol=AAPL "));
    assert!(requests[1].starts_with("GET /stock/metric?symbol=AAPL&metric=all "));
}

#[tokio::test]
async fn http_statuses_are_classified() {
    let (url, server) = serve(vec![
        Canned {
            status: 429,
            body: r#"{"error":"API limit reached. Please try again later."}"#,
            headers: vec![("retry-after", "7")],
        },
        canned(401, r#"{"error":"Invalid API key"}"#),
        canned(503, "upstream down"),
        canned(200, "not json"),
        canned(200, r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#),
    ])
    .await;
    let p = provider(&url);

    match p.fetch_quote("AAPL").await {
        Err(ProviderError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)))
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert!(p.fetch_quote("AAPL").await.unwrap_err().is_unauthorized());
    assert!(matches!(
        p.fetch_quote("AAPL").await,
        Err(ProviderError::Server { status: 503, .. })
    ));
    assert!(matches!(p.fetch_quote("AAPL").await, Err(ProviderError::Decode(_))));
    assert!(matches!(
        p.fetch_quote("NOPE").await,
        Err(ProviderError::UnknownSymbol(_))
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_transient() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let err = provider(&format!("http://{addr}"))
        .fetch_quote("AAPL")
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[test]
#[serial]
fn placeholder_key_is_rejected() {
    // SAFETY: serialized test; no other thread touches the environment.
    unsafe { std::env::set_var(API_KEY_ENV, "demo") };
    let res = FinnhubProvider::from_env(DEFAULT_BASE_URL, Duration::from_secs(1));
    assert!(matches!(res, Err(ProviderInitError::PlaceholderKey(_))));

    unsafe { std::env::remove_var(API_KEY_ENV) };
    let res = FinnhubProvider::from_env(DEFAULT_BASE_URL, Duration::from_secs(1));
    assert!(matches!(res, Err(ProviderInitError::MissingEnvVar(_))));
}

#[tokio::test]
#[serial]
#[ignore]
async fn live_finnhub_quote() {
    // This test requires FINNHUB_API_KEY to be set in the environment (or .env).
    dotenvy::dotenv().ok();
    if std::env::var(API_KEY_ENV).is_err() {
        println!("Skipping live_finnhub_quote: API key not set.");
        return;
    }

    let provider = FinnhubProvider::from_env(DEFAULT_BASE_URL, Duration::from_secs(10))
        .expect("Failed to create FinnhubProvider");
    let quote = provider.fetch_quote("AAPL").await.expect("live quote");
    assert!(quote.current > rust_decimal::Decimal::ZERO);

    let profile = provider.fetch_profile("AAPL").await.expect("live profile");
    assert!(profile.sector.is_some());
}
