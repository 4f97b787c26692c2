//! Workflow engine: step graphs executed by agent CLIs.
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowDefinition ──► stores (workflow, steps, edges)
//!                                              │
//!                                       WorkflowExecutor
//!                                              │
//!            rules/ ── RuleSelector ──┐        │
//!            skills/ ── SkillRunner ──┼──► step prompt ──► AgentCli (PTY)
//!            MEMORY.md / PRD ─────────┘                       │
//!                                              StepOutput ◄───┘
//! ```

pub mod executor;
pub mod graph;
pub mod output;
pub mod prd;
pub mod prompt;
pub mod schema;

pub use executor::WorkflowExecutor;
pub use graph::StepGraph;
pub use output::{parse_step_output, StepOutput, StepStatus};
pub use schema::{EdgeDefinition, StepDefinition, WorkflowDefinition};
