//! In-process runtime for MCP Mesh agents.
//!
//! An agent binary declares its capabilities with builders, registers
//! handlers against a process-local registry, and calls
//! [`MeshRuntime::run`] from `main`: declarations are flushed to the
//! registry service and a heartbeat loop keeps the registration alive.
//! Declared dependencies are resolved at call time by the
//! [`resolver::DependencyResolver`] — remote first, local fallback, cached.
//!
//! Registration failure is deliberately non-fatal: an agent that cannot
//! reach the registry keeps working standalone.

pub mod client;
pub mod descriptor;
pub mod env;
pub mod pipeline;
pub mod registry;
pub mod resolver;

pub use client::RegistryClient;
pub use descriptor::{AgentDescriptor, CapabilityDescriptor, DependencyDecl};
pub use env::MeshEnv;
pub use pipeline::MeshRuntime;
pub use registry::{CapabilityHandler, LocalRegistry};
pub use resolver::{DependencyResolver, DependencySpec};
