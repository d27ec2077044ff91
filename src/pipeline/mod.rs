//! Pipeline stages of one conversion.
//!
//! ## Data Flow
//!
//! ```text
//! scratch ──▶ supervisor ──▶ resolver ──▶ orchestrate ──▶ (session teardown)
//! (dir+port)  (spawn)       (connect)    (load/store)
//!                                             │
//!                                           sink
//! ```
//!
//! 1. [`scratch`]    private profile directory and a free port
//! 2. [`supervisor`] launch the engine headless; stop it with a grace period
//! 3. [`resolver`]   bounded retry loop until the control listener answers
//! 4. [`orchestrate`] the strictly ordered load → export exchange
//! 5. [`sink`]       adapts the caller's target to the engine's output calls
//!
//! [`session`] ties 1–3 together and guarantees teardown.

pub mod orchestrate;
pub mod resolver;
pub mod scratch;
pub mod session;
pub mod sink;
pub mod supervisor;
