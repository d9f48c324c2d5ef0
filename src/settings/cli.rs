use super::Parser;

/// Storefront proxy: session, cart and rate limiting in front of the shop API.
#[derive(Parser, Debug)]
#[command(name = "storefront", version)]
pub struct Cli {
    /// TOML settings file; defaults to `settings/dev.toml` in debug builds.
    #[arg(long)]
    pub settings: Option<String>,
}
