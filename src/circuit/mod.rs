//! Circuit inputs and the reference membership circuit.

mod input;
mod membership;

pub use input::{CircuitInput, CircuitInputBuilder, MAX_PARTIAL_DATA_LEN};
pub use membership::{domain_field, public_inputs, MembershipCircuit};
