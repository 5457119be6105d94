//! spectra-diag - On-demand diagnostics
//!
//! The analyzers the agent runs when the server asks for them:
//! - a bounded-memory top-N selection over file and directory sizes,
//! - a cancellable recursive disk-usage scanner feeding two such heaps,
//! - a raw-socket ICMP echo prober with reply/error correlation,
//! - the dispatcher that routes ping/traceroute/netstat/connect requests.
//!
//! Everything here is synchronous and blocking; command handlers run these
//! under `spawn_blocking` with the shared cancellation token.

mod heap;
mod icmp;
mod netdiag;
mod scan;

pub use heap::TopHeap;
pub use icmp::{calculate_checksum, ping, EchoRequest, ReplyKind};
pub use netdiag::run_network_diag;
pub use scan::scan_top;

pub use spectra_metrics::{Error, Result};
