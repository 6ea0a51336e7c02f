//! Async coordination used around the external formatter: a debouncer for
//! bursty editor events and a single-flight runner that keeps at most one
//! formatter invocation outstanding per target.

mod debounce;
mod single_flight;

pub use debounce::Debouncer;
pub use single_flight::{
  FlightError,
  Policy,
  SingleFlight,
};
