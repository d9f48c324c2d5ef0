use storefront::settings::*;

fn main() -> anyhow::Result<()> {
    // Load settings from the default location
    let project_settings = parse_settings(None)?;
    println!("Loaded settings: {:?}", project_settings);

    // Attempt to load from an invalid path (expected to fail)
    let is_err = parse_settings(Some("")).is_err();
    println!("Error on invalid path: {:?}", is_err);

    // Environment overrides win over the file
    // $ STOREFRONT__UPSTREAM__RETRY_ATTEMPTS=5 cargo run --bin settings_demo -- --settings=settings/dev.toml
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    println!(
        "Upstream: backend={} base_url={} retries={}",
        project_settings.upstream.backend,
        project_settings.upstream.base_url,
        project_settings.upstream.retry_attempts
    );
    Ok(())
}
