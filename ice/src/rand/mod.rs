
use rand::{thread_rng, Rng};

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;

pub fn generate_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = thread_rng();
    (0..n)
        .map(|_| {
            let idx = rng.gen_range(0..runes.len());
            runes[idx] as char
        })
        .collect()
}

/// Generates an ICE username fragment (RFC 8445 section 5.3).
pub fn generate_ufrag() -> String {
    generate_random_string(LEN_UFRAG, RUNES_ALPHA)
}

/// Generates an ICE password.
pub fn generate_pwd() -> String {
    generate_random_string(LEN_PWD, RUNES_ALPHA)
}

/// Generates the 64-bit tie breaker fixed for the channel lifetime.
pub fn generate_tie_breaker() -> u64 {
    thread_rng().gen::<u64>()
}
