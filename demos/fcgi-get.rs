use std::process::ExitCode;
use std::time::Duration;

use futures_util::io::{AllowStdIo, AsyncWriteExt};
use tracing::Instrument;

use fastcgi_mux::cgi::{self, Params};
use fastcgi_mux::{Client, Config, Target};


const USAGE: &str = "usage: fcgi-get <host:port | unix:/path> <script-filename> [query-string]";

/// Builds the CGI/1.1 environment of a plain GET request for `script`.
fn environment(script: &str, query: &str) -> Params {
    let name = format!("/{}", script.rsplit_once('/').map_or(script, |(_, file)| file));
    Params::new()
        .with(cgi::GATEWAY_INTERFACE, "CGI/1.1")
        .with(cgi::SERVER_SOFTWARE, concat!("fastcgi-mux/", env!("CARGO_PKG_VERSION")))
        .with(cgi::SERVER_PROTOCOL, "HTTP/1.1")
        .with(cgi::SERVER_NAME, "localhost")
        .with(cgi::SERVER_PORT, "80")
        .with(cgi::REMOTE_ADDR, "127.0.0.1")
        .with(cgi::REQUEST_METHOD, "GET")
        .with(cgi::SCRIPT_FILENAME, script)
        .with(cgi::REQUEST_URI, if query.is_empty() { name.clone() } else { format!("{name}?{query}") })
        .with(cgi::SCRIPT_NAME, name)
        .with(cgi::QUERY_STRING, query)
        .with(cgi::HTTP_HOST, "localhost")
}

async fn run(target: &Target, params: &Params) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default().with_request_timeout(Some(Duration::from_secs(30)));
    let client = Client::connect(target, config).await?;

    // The body is streamed to stdout once the headers are known
    let (mut writer, mut scanner) = cgi::split(AllowStdIo::new(std::io::stdout()));
    let produce = async {
        let end = client.request_stdout(params, b"", &mut writer).await?;
        writer.close().await?;
        Ok::<_, fastcgi_mux::Error>(end)
    };
    let consume = async {
        let (status, headers) = scanner.read_header_map().await?;
        eprintln!("Status: {}", status.unwrap_or(http::StatusCode::OK));
        for (name, value) in &headers {
            eprintln!("{name}: {}", value.to_str().unwrap_or("<binary>"));
        }
        scanner.pass_through().await
    };

    let (end, written) = tokio::join!(produce, consume);
    let end = match end {
        Ok(end) => end,
        Err(e) if e.is_connection_error() => {
            // Nothing more can be sent on this connection
            tracing::warn!(error = &e as &dyn std::error::Error, "FastCGI connection lost");
            return Err(e.into());
        },
        Err(e) => {
            client.close().await?;
            return Err(e.into());
        },
    };
    written?;
    tracing::info!(app_status = end.app_status, protocol_status = ?end.protocol_status, "request finished");
    client.close().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let mut args = std::env::args().skip(1);
    let (Some(target), Some(script)) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let query = args.next().unwrap_or_default();

    let target: Target = match target.parse() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::FAILURE;
        },
    };

    let span = tracing::info_span!("fcgi_get", %target, %script);
    match run(&target, &environment(&script, &query)).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error: &dyn std::error::Error = &*e;
            tracing::error!(error, "request failed");
            ExitCode::FAILURE
        },
    }
}


/// Sets up a basic `tracing` subscriber to stderr. Its verbosity level is
/// configured with the `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{filter::LevelFilter, fmt};
    let max_level = match std::env::var("RUST_LOG") {
        Ok(var) if !var.is_empty() => var.parse::<LevelFilter>().unwrap_or_else(|e| {
            eprintln!("Ignoring `RUST_LOG={var}`: {e}");
            LevelFilter::WARN
        }),
        _ => LevelFilter::WARN,
    };

    fmt::fmt()
        .with_timer(fmt::time::uptime())
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}
