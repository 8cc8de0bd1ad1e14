pub mod fake_resend;
pub mod fake_smtp;
pub mod fake_turnstile;

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};

/// Routes `log` (and `tracing` events without a subscriber) to the terminal.
///
/// Only the first call in a test binary installs the logger; later calls are no-ops.
pub fn setup_logging() {
    let _ = CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

/// Binds a listener on an ephemeral loopback port.
pub(crate) async fn bind_ephemeral() -> (tokio::net::TcpListener, std::net::SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    (listener, address)
}
