//! Two views sharing a theme preference through the session store.
//!
//! Run with `RUST_LOG=tincan_session=debug` to see binding lifecycle logs.

use tincan_session::{use_session_store, SessionContext};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Theme Demo ===\n");

    let (header_theme, set_theme, unset_theme, _) =
        use_session_store("theme", "light".to_string()).expect("bind header");
    let (footer_theme, _, _, _) =
        use_session_store("theme", "light".to_string()).expect("bind footer");

    let _watch = footer_theme.watch(|theme| {
        println!("  footer re-renders with: {:?}", theme);
    });

    println!("Header: {:?}", header_theme.get());

    println!("\nSwitching to dark:");
    set_theme.set("dark".to_string()).expect("set theme");
    println!("Header: {:?}", header_theme.get());

    println!("\nToggling:");
    set_theme
        .update(|prev| match prev.as_deref() {
            Some("dark") => "light".to_string(),
            _ => "dark".to_string(),
        })
        .expect("toggle theme");

    println!("\nResetting:");
    unset_theme.unset();
    let stored = SessionContext::current()
        .storage()
        .and_then(|s| s.get_item("theme"));
    println!("Stored entry after reset: {:?}", stored);
}
