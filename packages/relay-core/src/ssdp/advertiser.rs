//! The relay's SSDP presence state machine.
//!
//! `Uninitialized → Advertising → Withdrawn`. One [`PresenceAdvertiser`] is
//! shared by the heartbeat, the search monitor and the shutdown path. Every
//! announcement is sent while the state lock is held, so once [`bye`] has
//! returned no alive can follow it.
//!
//! [`bye`]: PresenceAdvertiser::bye

use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use super::message::{build_alive, build_bye, SearchRequest};
use super::transport::SsdpTransport;
use super::{SsdpError, SsdpResult};
use crate::identity::DeviceIdentity;

/// Live advertisement parameters. Read-only once created.
#[derive(Debug, Clone)]
pub struct AdvertisementSession {
    interface: Ipv4Addr,
    identity: DeviceIdentity,
    location: String,
    max_age: u32,
}

impl AdvertisementSession {
    pub fn new(
        interface: Ipv4Addr,
        identity: DeviceIdentity,
        location: impl Into<String>,
        max_age: u32,
    ) -> Self {
        Self {
            interface,
            identity,
            location: location.into(),
            max_age,
        }
    }

    #[must_use]
    pub fn interface(&self) -> Ipv4Addr {
        self.interface
    }

    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    fn alive_message(&self) -> String {
        build_alive(&self.identity, &self.location, self.max_age)
    }

    fn bye_message(&self) -> String {
        build_bye(&self.identity)
    }
}

/// Observable phase of the advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresencePhase {
    Uninitialized,
    Advertising,
    Withdrawn,
}

enum Presence {
    Uninitialized,
    Advertising(AdvertisementSession),
    Withdrawn,
}

/// Owns the advertisement session and serializes every announcement.
pub struct PresenceAdvertiser {
    transport: Arc<dyn SsdpTransport>,
    state: Mutex<Presence>,
}

impl PresenceAdvertiser {
    pub fn new(transport: Arc<dyn SsdpTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(Presence::Uninitialized),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> PresencePhase {
        match *self.state.lock() {
            Presence::Uninitialized => PresencePhase::Uninitialized,
            Presence::Advertising(_) => PresencePhase::Advertising,
            Presence::Withdrawn => PresencePhase::Withdrawn,
        }
    }

    /// Enters `Advertising` and sends the first alive.
    ///
    /// An identity with a blank UUID is rejected and the state is unchanged.
    /// A failed first send is logged only; the heartbeat will retry it.
    pub fn start(&self, session: AdvertisementSession) -> SsdpResult<()> {
        let mut state = self.state.lock();
        match *state {
            Presence::Uninitialized => {}
            Presence::Advertising(_) => return Err(SsdpError::AlreadyStarted),
            Presence::Withdrawn => return Err(SsdpError::Withdrawn),
        }
        if !session.identity().is_advertisable() {
            return Err(SsdpError::MissingUuid);
        }

        log::info!(
            "[Ssdp] Advertising {} ({}) at {} on {}, max-age={}",
            session.identity().uuid,
            session.identity().device_type,
            session.location(),
            session.interface(),
            session.max_age()
        );
        if let Err(e) = self.transport.send(session.alive_message().as_bytes()) {
            log::warn!("[Ssdp] Initial alive failed: {}", e);
        }
        *state = Presence::Advertising(session);
        Ok(())
    }

    /// Sends an unsolicited alive.
    ///
    /// Returns `Ok(false)` without sending unless the advertiser is in
    /// `Advertising`.
    pub fn alive(&self) -> SsdpResult<bool> {
        let state = self.state.lock();
        let Presence::Advertising(session) = &*state else {
            return Ok(false);
        };
        self.transport.send(session.alive_message().as_bytes())?;
        Ok(true)
    }

    /// Answers a discovery search by re-announcing, if the search type matches.
    pub fn on_search(&self, request: &SearchRequest) -> SsdpResult<bool> {
        if request.should_answer() {
            log::debug!(
                "[Ssdp] Search: From={} Type={}",
                request.source,
                request.search_type
            );
            self.alive()
        } else {
            log::debug!(
                "[Ssdp] Search Unknown: From={} Type={}",
                request.source,
                request.search_type
            );
            Ok(false)
        }
    }

    /// Withdraws the advertisement. Terminal.
    ///
    /// Only the first call while `Advertising` sends a bye and returns
    /// `Ok(true)`. Every later call is a no-op.
    pub fn bye(&self) -> SsdpResult<bool> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, Presence::Withdrawn) {
            Presence::Advertising(session) => {
                log::info!("[Ssdp] Withdrawing {}", session.identity().uuid);
                self.transport.send(session.bye_message().as_bytes())?;
                Ok(true)
            }
            Presence::Uninitialized | Presence::Withdrawn => Ok(false),
        }
    }
}
