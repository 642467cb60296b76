use std::{iter, time::Duration};

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// How long to keep pinging a fresh MongoDB client before giving up.
#[derive(Debug, Clone, Copy)]
pub struct ConnectBackoff {
    /// Pings to try, the first one included.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConnectBackoff {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ConnectBackoff {
    /// Sleeps between consecutive attempts, doubling up to `max_delay`.
    fn delays(self) -> impl Iterator<Item = Duration> {
        iter::successors(Some(self.initial_delay), move |delay| {
            Some((*delay * 2).min(self.max_delay))
        })
        .take(self.attempts.saturating_sub(1) as usize)
    }
}

/// Open the mirror database and wait until it answers a ping.
pub async fn connect(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut delays = config.backoff.delays();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let source = match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok(database),
            Err(err) => err,
        };
        let Some(delay) = delays.next() else {
            return Err(MongoDaoError::InitialPing { attempts, source });
        };
        debug!(
            attempts,
            database = %config.database_name,
            retry_in_ms = delay.as_millis() as u64,
            "mirror database not reachable yet"
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let backoff = ConnectBackoff {
            attempts: 5,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(1),
        };
        let delays: Vec<_> = backoff.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![300, 600, 1000, 1000]);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let backoff = ConnectBackoff {
            attempts: 1,
            ..ConnectBackoff::default()
        };
        assert_eq!(backoff.delays().count(), 0);
    }
}
