//! In-memory doubles for the transport and clock contracts, shared by the
//! unit tests.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::connection::{Connection, ConnectionType};
use crate::error::{Error, Result};

/// A connection fed from a fixed byte script. Writes land in a sink that
/// may be shared between handles, so a test can watch the traffic a
/// subscriber receives while other connections dispatch.
#[derive(Clone)]
pub struct TestConnection {
    input: Arc<Mutex<Input>>,
    written: Arc<Mutex<Vec<u8>>>,
    kind: Arc<Mutex<ConnectionType>>,
    fail_writes: Arc<Mutex<bool>>,
    id: u32,
}

struct Input {
    data: Vec<u8>,
    position: usize,
}

impl TestConnection {
    pub fn new(input: &[u8]) -> Self {
        Self::with_sink(input, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_sink(input: &[u8], written: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            input: Arc::new(Mutex::new(Input {
                data: input.to_vec(),
                position: 0,
            })),
            written,
            kind: Arc::new(Mutex::new(ConnectionType::Unknown)),
            fail_writes: Arc::new(Mutex::new(false)),
            id: 0,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Everything written on this connection (and its duplicates) so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// How far the input script has been consumed.
    pub fn position(&self) -> usize {
        self.input.lock().unwrap().position
    }

    /// Make writes on this connection (and its duplicates) fail, as a dead
    /// peer's socket would.
    pub fn set_write_failure(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }
}

impl Connection for TestConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut input = self.input.lock().unwrap();
        if input.data.len() - input.position < buf.len() {
            return Err(Error::TransportDead("end of scripted input"));
        }
        let start = input.position;
        buf.copy_from_slice(&input.data[start..start + buf.len()]);
        input.position += buf.len();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(Error::TransportDead("scripted write failure"));
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) {}

    fn duplicate(&self) -> Self {
        self.clone()
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn connection_type(&self) -> ConnectionType {
        *self.kind.lock().unwrap()
    }

    fn set_connection_type(&mut self, kind: ConnectionType) {
        *self.kind.lock().unwrap() = kind;
    }
}

/// A clock pinned to a settable instant.
#[derive(Default)]
pub struct FakeClock {
    pub time: u32,
}

impl Clock for FakeClock {
    fn timestamp(&self) -> u32 {
        self.time
    }
}
