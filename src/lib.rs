//! Stagehand: multi-stage workflow orchestration for software-delivery
//! agents.
//!
//! A workflow (build an app, fix a bug, ship a hotfix) is walked through an
//! ordered list of stages. Each stage is served by one agent type, reached
//! over a publish/subscribe bus with versioned, contract-checked task and
//! result envelopes. The orchestrator owns every timeout, retry and state
//! transition; agents only answer.
//!
//! # Architecture
//!
//! Stagehand follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (in-memory bus and
//!   repositories)
//!
//! # Modules
//!
//! - [`envelope`]: Identifiers, task and result envelopes, error codes
//! - [`contract`]: Versioned contracts, schemas and migrations
//! - [`stage`]: Stage sequences and routing per workflow type
//! - [`bus`]: Publish/subscribe transport
//! - [`dispatch`]: Pending tasks, timeouts and retries
//! - [`workflow`]: Workflow state machine and orchestration service
//! - [`agent`]: Agent registration and health
//! - [`config`]: TOML configuration
//! - [`telemetry`]: Tracing initialisation

pub mod agent;
pub mod bus;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod envelope;
pub mod stage;
pub mod telemetry;
pub mod workflow;
