// Request correlation helpers.

/// Short hex correlation id minted at request entry.
pub fn generate_request_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}
