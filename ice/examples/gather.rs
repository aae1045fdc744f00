use std::io::Write;

use clap::{App, Arg};
use rtcice::channel::{IceChannel, IceChannelConfig, IceServerConfig};
use rtcice::state::GatheringState;
use tokio::sync::mpsc;

// Gathers local candidates, optionally against a STUN/TURN server, and
// prints each candidate line as it is produced.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} [{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                chrono::Local::now().format("%H:%M:%S.%6f"),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();

    let matches = App::new("gather")
        .about("gathers ICE candidates and prints them")
        .arg(
            Arg::new("server")
                .long("server")
                .takes_value(true)
                .help("STUN/TURN URI, e.g. stun:stun.l.google.com:19302"),
        )
        .arg(
            Arg::new("username")
                .long("username")
                .takes_value(true)
                .help("TURN username"),
        )
        .arg(
            Arg::new("credential")
                .long("credential")
                .takes_value(true)
                .help("TURN credential"),
        )
        .get_matches();

    let mut ice_servers = vec![];
    if let Some(server) = matches.value_of("server") {
        ice_servers.push(IceServerConfig {
            urls: server.to_owned(),
            username: matches.value_of("username").map(str::to_owned),
            credential: matches.value_of("credential").map(str::to_owned),
        });
    }

    let channel = IceChannel::new(IceChannelConfig {
        ice_servers,
        ..Default::default()
    })
    .await?;

    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    channel.on_candidate(Box::new(|c| {
        Box::pin(async move {
            println!("candidate:{}", c.marshal());
        })
    }));
    channel.on_candidate_error(Box::new(|_, reason| {
        Box::pin(async move {
            eprintln!("candidate error: {reason}");
        })
    }));
    channel.on_gathering_state_change(Box::new(move |state| {
        let done_tx = done_tx.clone();
        Box::pin(async move {
            if state == GatheringState::Complete {
                let _ = done_tx.send(()).await;
            }
        })
    }));

    let (ufrag, pwd) = channel.local_credentials().await;
    println!("ice-ufrag:{ufrag}");
    println!("ice-pwd:{pwd}");

    channel.start_gather().await?;
    let _ = done_rx.recv().await;

    channel.close().await?;
    Ok(())
}
