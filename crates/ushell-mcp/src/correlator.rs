//! Request id assignment.

use crate::connection::Connection;
use crate::error::Result;
use crate::message::{Request, RequestId, RequestParams};

/// Hands out request ids for one connection.
///
/// Ids start at 1 and only ever increase, so a late message for an earlier
/// request can never be mistaken for the current one.
#[derive(Debug)]
pub struct Correlator {
    next: u64,
}

impl Default for Correlator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl Correlator {
    /// Create a correlator for a fresh connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id.
    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next);
        self.next += 1;
        id
    }

    /// Stamp `params` with a fresh id and send it.
    ///
    /// The id is consumed even if the send fails.
    pub fn issue(&mut self, connection: &mut Connection, params: RequestParams) -> Result<RequestId> {
        let request = Request::new(self.next_id(), params);
        connection.send(&request)?;
        Ok(request.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let mut correlator = Correlator::new();
        let ids: Vec<RequestId> = (0..100).map(|_| correlator.next_id()).collect();
        assert_eq!(ids[0].to_string(), "1");
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

        let mut rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        rendered.sort();
        rendered.dedup();
        assert_eq!(rendered.len(), 100);
    }
}
