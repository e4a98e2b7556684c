use abrha::AbrhaProvider;
use tfplug::ServeConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tfplug::logging::init_from_env()?;

    tfplug::serve(AbrhaProvider::new(), ServeConfig::default()).await?;

    Ok(())
}
