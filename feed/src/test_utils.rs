//! Shared fixtures for unit tests

use std::sync::Arc;

use crate::adapters::InMemoryLedger;
use crate::app::{FeedPoster, FeedReader};
use crate::domain::entities::{Address, Keypair};
use crate::domain::ports::Ledger;

pub const FIRST_POST: &str = "First post! 💫";

/// A freshly bootstrapped feed on an in-memory ledger
pub struct TestFeed {
    pub program_id: Address,
    pub payer: Keypair,
    pub author: Keypair,
    pub first_message: Keypair,
    pub reader: FeedReader<InMemoryLedger>,
    pub poster: FeedPoster<InMemoryLedger>,
}

/// Deploy a feed program and post the first message, creating its author
pub async fn bootstrap_feed(ledger: &Arc<InMemoryLedger>) -> TestFeed {
    let program_id = ledger.deploy_message_feed_program();
    let payer = Keypair::generate();
    ledger
        .request_airdrop(&payer.address(), 1_000_000_000)
        .await
        .unwrap();

    let reader = FeedReader::new(ledger.clone());
    let poster = FeedPoster::new(ledger.clone());
    let first_message = Keypair::generate();
    let receipt = poster
        .post_message_with_program_id(
            &program_id,
            &payer,
            None,
            &first_message,
            FIRST_POST,
            None,
            None,
        )
        .await
        .unwrap();

    TestFeed {
        program_id,
        payer,
        author: receipt.author,
        first_message,
        reader,
        poster,
    }
}
