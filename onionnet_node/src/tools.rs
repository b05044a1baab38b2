/*! One-shot commands that talk to a running network and exit.
*/

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Error;
use clap::ArgMatches;
use itertools::Itertools;
use onionnet::core::client::{json_message, Client};
use onionnet::core::directory::DirectoryClient;
use onionnet::core::net::DEFAULT_IO_TIMEOUT;
use onionnet::core::relay::keys::load_keys;
use onionnet::crypto::fingerprint;
use tokio::runtime;

use crate::node_config::{circuit_length, optional};

/// Run `future` to completion, print its error if any and exit.
fn run_and_exit<F>(future: F) -> !
    where F: Future<Output = Result<(), Error>>
{
    let result = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(future));

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1)
        },
    }
}

fn directory(matches: &ArgMatches) -> Result<DirectoryClient, Error> {
    let cds_addr = optional::<SocketAddr>(matches, "cds-address")
        .ok_or_else(|| anyhow::anyhow!("'cds-address' is not set"))?;
    let mut directory = DirectoryClient::new(cds_addr);
    directory.set_timeout(io_timeout(matches));
    Ok(directory)
}

fn io_timeout(matches: &ArgMatches) -> Duration {
    optional::<u64>(matches, "io-timeout").map(Duration::from_secs).unwrap_or(DEFAULT_IO_TIMEOUT)
}

/// Send a message through a new circuit and print the path and the response.
pub fn run_send(matches: &ArgMatches) -> ! {
    run_and_exit(async {
        let message = optional::<String>(matches, "message").unwrap_or_default();
        let mut client = Client::new(directory(matches)?);
        client.set_destination(optional(matches, "destination"));
        client.set_io_timeout(io_timeout(matches));

        let delivery = client.send_message(circuit_length(matches), &json_message(&message)).await?;

        println!("Path: {}", delivery.path.iter().map(|relay| &relay.id).join(" -> "));
        match delivery.destination_response() {
            Ok(response) if !response.is_ok() => {
                println!("Destination error: {}", response.error.unwrap_or_default());
            },
            _ => println!("Response: {}", String::from_utf8_lossy(&delivery.response)),
        }
        Ok(())
    })
}

/// Print relays known to the directory.
pub fn run_relays(matches: &ArgMatches) -> ! {
    run_and_exit(async {
        let relays = directory(matches)?.list_relays().await?;
        if relays.is_empty() {
            println!("No relays registered");
        }
        for relay in relays {
            println!("{}\t{}\t{}", relay.id, relay.addr(), relay.fingerprint);
        }
        Ok(())
    })
}

/// Print public key and fingerprint stored in a keys file.
pub fn run_fingerprint(matches: &ArgMatches) -> ! {
    run_and_exit(async {
        let keys_file = optional::<String>(matches, "keys-file").unwrap_or_default();
        let keys = load_keys(Path::new(&keys_file))?;
        println!("{}", hex::encode(keys.pk.as_bytes()).to_uppercase());
        println!("{}", fingerprint(&keys.pk));
        Ok(())
    })
}
