//! The relay's steady-state event wait.
//!
//! Once the advertiser is live, the main task only multiplexes two events:
//! the heartbeat tick and the shutdown signal. Shutdown always wins a tie.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ssdp::{PresenceAdvertiser, SsdpResult};

/// Re-announces every `period` until `shutdown` fires, then withdraws.
///
/// The first tick comes one full period after the call. Returns whether a bye
/// was actually sent.
pub async fn run_heartbeat(
    advertiser: &PresenceAdvertiser,
    period: Duration,
    shutdown: &CancellationToken,
) -> SsdpResult<bool> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = advertiser.alive() {
                    log::warn!("[Relay] Heartbeat alive failed: {}", e);
                }
            }
        }
    }

    log::info!("[Relay] bye");
    advertiser.bye()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssdp::advertiser::tests::advertising;
    use crate::ssdp::PresencePhase;

    const PERIOD: Duration = Duration::from_secs(10);

    fn cancel_after(token: &CancellationToken, after: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn announces_every_period_until_shutdown() {
        let (transport, advertiser) = advertising();
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(35));

        let sent_bye = run_heartbeat(&advertiser, PERIOD, &token).await.unwrap();

        assert!(sent_bye);
        // Start-up alive plus ticks at 10, 20 and 30 seconds.
        assert_eq!(transport.count("ssdp:alive"), 4);
        assert_eq!(transport.count("ssdp:byebye"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_a_full_period() {
        let (transport, advertiser) = advertising();
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_secs(9));

        run_heartbeat(&advertiser, PERIOD, &token).await.unwrap();

        assert_eq!(transport.count("ssdp:alive"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_sends_exactly_one_bye_and_nothing_after() {
        let (transport, advertiser) = advertising();
        let token = CancellationToken::new();
        cancel_after(&token, PERIOD * 2);

        run_heartbeat(&advertiser, PERIOD, &token).await.unwrap();
        tokio::time::sleep(PERIOD * 5).await;
        assert!(!advertiser.alive().unwrap());

        let messages = transport.messages();
        assert_eq!(transport.count("ssdp:byebye"), 1);
        assert!(messages.last().is_some_and(|m| m.contains("ssdp:byebye")));
        assert_eq!(advertiser.phase(), PresencePhase::Withdrawn);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_withdraws_immediately() {
        let (transport, advertiser) = advertising();
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();

        assert!(run_heartbeat(&advertiser, PERIOD, &token).await.unwrap());

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(transport.messages().len(), 2);
    }
}
