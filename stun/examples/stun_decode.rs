use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use rtcice_stun::message::Message;

// Decodes a base64-encoded STUN message passed as the first argument and
// prints its header and attributes.
fn main() {
    let encoded = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            eprintln!("usage: stun_decode <base64 message>");
            std::process::exit(1);
        }
    };

    let data = match BASE64_STANDARD.decode(encoded) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("invalid base64: {err}");
            std::process::exit(1);
        }
    };

    let mut message = Message::new();
    match message.write(&data) {
        Ok(_) => {
            println!("{message}");
            for attr in &message.attributes.0 {
                println!("  {attr}");
            }
        }
        Err(err) => {
            eprintln!("unable to decode: {err}");
            std::process::exit(1);
        }
    }
}
