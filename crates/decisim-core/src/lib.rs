//! The decisim decision-theoretic social simulation engine.
//!
//! A factored-state, piecewise-linear-dynamics simulation core: state lives in independent
//! probability distributions over keyed vectors, dynamics are registered per key as
//! action-conditioned piecewise-linear trees, and agents choose actions via a bounded-horizon
//! expectimax lookahead policy over their own (possibly subjective) beliefs about the world.
//!
//! # Modules
//!
//! - [`symbol`] -- the process-wide symbol table backing enum and action-set domains
//! - [`vector`] / [`matrix`] -- the keyed-vector and keyed-matrix numeric primitives
//! - [`distribution`] -- the generic probability distribution both are built from
//! - [`state`] -- the factored `DistributionSet`
//! - [`variables`] -- declared variable domains and value/float conversion
//! - [`plt`] -- piecewise-linear trees: deterministic and stochastic dynamics leaves
//! - [`dynamics`] -- the per-key dynamics registry and its lookup algorithm
//! - [`dependency`] -- the SCC-condensed dependency graph over registered dynamics
//! - [`turn`] -- turn scheduling and the default turn-counter dynamics
//! - [`agent`] -- agent mental models and the collaborator trait
//! - [`estimator`] -- the default Bayesian state estimator
//! - [`policy`] -- the bounded-horizon lookahead policy
//! - [`world`] -- the top-level orchestrator tying every module together
//! - [`gc`] -- optional reachability-based model garbage collection
//! - [`explain`] -- diagnostic narration at configurable verbosity
//! - [`config`] -- engine-wide configuration
//! - [`error`] -- the engine's error taxonomy

pub mod agent;
pub mod config;
pub mod dependency;
pub mod distribution;
pub mod dynamics;
pub mod error;
pub mod estimator;
pub mod explain;
pub mod gc;
pub mod matrix;
pub mod plt;
pub mod policy;
pub mod state;
pub mod symbol;
pub mod turn;
pub mod variables;
pub mod vector;
pub mod world;

pub use agent::{Agent, AgentModel, Beliefs, Decision, Observation};
pub use config::EngineConfig;
pub use distribution::{Distribution, MatrixDistribution, VectorDistribution};
pub use error::CoreError;
pub use matrix::KeyedMatrix;
pub use plt::Plt;
pub use policy::LookaheadPolicy;
pub use state::DistributionSet;
pub use turn::{TurnScheduler, TurnSlot};
pub use vector::KeyedVector;
pub use world::{AgentRuntime, StepOutcome, World};
