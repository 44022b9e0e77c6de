// lbsim-simulator/src/lib.rs

/*!
# lbsim Simulator

Feeds recorded traffic into a [`lbsim_core::balancer::Balancer`].

## Key Components:
- **Trace Loader:** parses `<timestamp>,<seconds>` CSV records, skipping the
  ones that do not parse.
- **Replay Engine:** sends each request at its recorded offset from the
  previous one, optionally compressed by a time scale.
*/

pub mod replay;
pub mod trace;

pub use replay::{ReplaySummary, TraceReplayer};
pub use trace::{load_trace, parse_trace, Trace, TraceError};
