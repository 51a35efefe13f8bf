//! Call-site shim contract

use crate::types::{Outcome, RequestRecord};

/// Boundary between the engine and a concrete networking library
///
/// A shim wraps its library's dispatch in this trait: it translates the
/// library request into a [`RequestRecord`] and the library result into an
/// [`Outcome`]. Network-level failures are returned as `Outcome::Failure`,
/// never as a Rust error, so the engine can capture and later reproduce them.
pub trait Dispatcher {
    /// Perform the real outbound call
    fn perform(&self, request: &RequestRecord) -> Outcome;
}

impl<F> Dispatcher for F
where
    F: Fn(&RequestRecord) -> Outcome,
{
    fn perform(&self, request: &RequestRecord) -> Outcome {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseRecord;

    #[test]
    fn test_closure_dispatcher() {
        let dispatcher = |request: &RequestRecord| {
            Outcome::Success(ResponseRecord {
                status: 200,
                headers: vec![],
                body: request.url.clone().into_bytes(),
            })
        };

        let request = RequestRecord::new("GET", "https://api.example.com/users/1");
        let outcome = dispatcher.perform(&request);
        assert!(outcome.is_success());
    }
}
