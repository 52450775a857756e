use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Doubling delays between ping attempts, capped at [`MAX_BACKOFF`].
fn backoff() -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(FIRST_BACKOFF), |delay| Some((*delay * 2).min(MAX_BACKOFF)))
}

/// Open a client for the users database and wait until it answers a ping.
pub async fn establish_connection(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut delays = backoff();
    for attempt in 1..=config.connect_attempts {
        let Err(err) = database.run_command(doc! { "ping": 1 }).await else {
            return Ok((client, database));
        };
        if attempt == config.connect_attempts {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source: err,
            });
        }
        let delay = delays.next().unwrap_or(MAX_BACKOFF);
        debug!(attempt, ?delay, error = %err, "users database not answering yet");
        sleep(delay).await;
    }

    Err(MongoDaoError::NoConnectAttempts)
}
