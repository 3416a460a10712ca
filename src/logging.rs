use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "kotoba_cards=debug"
    } else {
        "kotoba_cards=info"
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `debug`.
///
/// Output goes to stderr so stdout stays free for command results.
pub fn init(debug: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(debug).into());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
