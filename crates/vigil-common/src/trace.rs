use rand::Rng;
use std::fmt::Write;

/// Generates a 16-character hex trace id (8 random bytes).
///
/// The same id follows a point from ingest to its Event and Alert rows.
pub fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}
