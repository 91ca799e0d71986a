//! searchscale-control: the distributed provisioning control loop.
//!
//! Two independently ticking tasks share one [`ControlContext`]:
//!
//! - **Main loop**: when this process is leader and the Operation State is
//!   `Idle`, asks the recommendation source for an action, records it, and
//!   runs the matching provisioning action.
//! - **Recovery loop**: when leadership moves to this process (or the
//!   process starts as leader) and the Operation State is not `Idle`,
//!   resumes the recorded operation.
//!
//! The shared document store is the only coordination medium. Mutual
//! exclusion across processes rests on the leadership oracle never
//! reporting two leaders at once; that precondition is not checked here.
//!
//! ```text
//! MainLoop ──▶ LeadershipOracle ──▶ RecommendationSource ──▶ Provisioner
//!    │                                                          │
//!    └──────────────▶ StateManager ◀────────────────────────────┘
//!                          ▲
//! RecoveryLoop ────────────┘ (resume on false→true leadership edge)
//! ```

pub mod bootstrap;
pub mod budget;
pub mod context;
pub mod error;
pub mod leader;
pub mod main_loop;
pub mod metrics;
pub mod recommend;
pub mod recovery;

pub use bootstrap::{ComponentFactory, Components, Daemon, OpenSearchComponents, initialize, run};
pub use budget::{FailureBudget, RetryPolicy};
pub use context::ControlContext;
pub use error::{ControlError, InitError};
pub use leader::{LeadershipOracle, OpenSearchLeadership, StaticLeadership};
pub use main_loop::{MainLoop, MainTick};
pub use metrics::{MetricSource, OpenSearchMetrics, SimulatorMetrics};
pub use recommend::{Recommendation, RecommendationSource, RuleEvaluator};
pub use recovery::{RecoveryLoop, RecoveryTick};
