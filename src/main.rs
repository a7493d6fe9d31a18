use tracing::{error, info, Level};

use cryptolytica::{
    configuration::{get_configuration, set_configuration, AppState, State},
    error::Error,
    handler::cache_refresher,
    provider::Event,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    set_configuration()?;
    let config = get_configuration()?;

    let state = State::new(config)?;
    let app_state = AppState::new(state);
    let event_manager = Event::new(app_state.clone());

    tokio::select! {
        result = async {
            tokio::try_join!(
                event_manager.run(),
                cache_refresher::cache_refresh_task(app_state.clone()),
            )
        } => {
            result?;
            info!("Background tasks finished");
        },
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
        },
    }

    Ok(())
}
