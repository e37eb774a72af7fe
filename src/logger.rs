use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::peer::types::IceCandidate;

/// Installs the global fmt subscriber. Returns `false` when logging is
/// disabled or a subscriber is already installed.
pub fn init(config: &LogConfig) -> bool {
    if !config.enabled {
        return false;
    }
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Logs a trickle ICE candidate as it appears
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index, cand.username_fragment
    );
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMix {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

/// Counts candidate types and warns when no relay path was gathered.
pub fn analyze_candidates<'a>(
    label: &str,
    candidates: impl IntoIterator<Item = &'a IceCandidate>,
) -> CandidateMix {
    let mut mix = CandidateMix::default();
    for candidate in candidates {
        match candidate.kind() {
            Some("host") => mix.host += 1,
            Some("srflx") => mix.srflx += 1,
            Some("relay") => mix.relay += 1,
            _ => {}
        }
    }

    info!(
        "[{label}] Candidate analysis: {} host, {} srflx, {} relay",
        mix.host, mix.srflx, mix.relay
    );
    if mix.relay == 0 {
        warn!("[{label}] No TURN relay candidates found! Connection through NAT may fail.");
    }
    mix
}
