use std::sync::Arc;

use antisc_core::{
    config::Config,
    logging::{Logger, TracingLogger},
    ports::ScriptConverter,
};
use antisc_zhconv::ZhconvConverter;

#[tokio::main]
async fn main() -> Result<(), antisc_core::Error> {
    antisc_core::logging::init("antisc")?;

    let cfg = Arc::new(Config::load()?);
    let converter: Arc<dyn ScriptConverter> =
        Arc::new(ZhconvConverter::from_tag(&cfg.convert_target)?);
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);

    antisc_telegram::router::run_polling(cfg, converter, logger)
        .await
        .map_err(|e| antisc_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
