//! Feed → assembler → reader, wired through `connect`.

use std::time::Duration;

use chainfill_stream::{connect, ReaderBuilder, ReplayFeed};

fn line(block: u64, undo: bool, lib: u64, action: &str) -> String {
    serde_json::json!({
        "undo": undo,
        "irreversibleBlockNum": lib,
        "cursor": format!("cursor-{block}-{action}"),
        "trace": {
            "id": format!("trx-{block}-{action}"),
            "block": {
                "num": block,
                "id": format!("{block:08x}"),
                "previous": format!("{:08x}", block - 1),
                "timestamp": "2019-06-04T12:00:00Z"
            },
            "matchingActions": [{
                "account": "eosio.token",
                "name": action,
                "data": {},
                "authorization": [{ "actor": "alice", "permission": "active" }]
            }]
        }
    })
    .to_string()
}

fn capture(lines: &[String]) -> ReplayFeed {
    ReplayFeed::from_jsonl(&lines.join("\n"))
}

#[tokio::test]
async fn reader_serves_contiguous_blocks_from_feed() {
    let feed = capture(&[
        line(10, false, 8, "transfer"),
        line(10, false, 8, "issue"),
        line(13, false, 9, "transfer"),
        "{ \"liveMarker\": true }".to_string(),
        line(14, false, 12, "transfer"),
    ]);
    let config = ReaderBuilder::new()
        .start_at_block(10)
        .poll_interval_ms(5)
        .build_config()
        .unwrap();
    let (mut reader, driver) = connect(config, feed).unwrap();

    let mut delivered = Vec::new();
    for _ in 10..=13 {
        let next = tokio::time::timeout(Duration::from_secs(2), reader.get_next_block())
            .await
            .expect("reader stalled");
        delivered.push(next);
    }

    let numbers: Vec<u64> = delivered.iter().map(|b| b.number()).collect();
    assert_eq!(numbers, vec![10, 11, 12, 13]);

    let first = &delivered[0];
    assert!(first.block_meta.is_earliest_block);
    let names: Vec<&str> = first.block.actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["transfer", "issue"]);
    assert!(delivered[1].block.actions.is_empty());
    assert_eq!(delivered[2].block.block_info.block_hash, format!("{:08x}", 12));

    assert_eq!(reader.get_head_block_number().await, 14);
    assert_eq!(reader.get_last_irreversible_block_number().await, 12);
    assert!(reader.assembler().is_live_marker_reached());

    driver.abort();
}

#[tokio::test]
async fn rollback_is_signalled_in_sequence() {
    let feed = capture(&[
        line(20, false, 15, "transfer"),
        line(21, false, 15, "transfer"),
        line(21, true, 15, "transfer"),
        line(22, false, 15, "transfer"),
    ]);
    let config = ReaderBuilder::new()
        .start_at_block(20)
        .poll_interval_ms(5)
        .build_config()
        .unwrap();
    let (mut reader, driver) = connect(config, feed).unwrap();

    let b20 = reader.get_next_block().await;
    let b21 = reader.get_next_block().await;
    assert_eq!((b20.number(), b21.number()), (20, 21));
    assert!(!b21.is_rollback());

    // The undo of #21 sits behind the cursor; the consumer seeks back to see it.
    let undo = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if reader.queued_len() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(undo.is_ok());
    reader.seek_to_block(21);
    let rolled_back = reader.get_next_block().await;
    assert_eq!(rolled_back.number(), 21);
    assert!(rolled_back.is_rollback());

    driver.abort();
}

#[tokio::test]
async fn tail_mode_starts_where_the_feed_starts() {
    let feed = capture(&[
        line(5_000, false, 4_990, "transfer"),
        line(5_002, false, 4_990, "transfer"),
    ]);
    let config = ReaderBuilder::new()
        .tail(100)
        .poll_interval_ms(5)
        .build_config()
        .unwrap();
    let (mut reader, driver) = connect(config, feed).unwrap();

    let first = reader.get_next_block().await;
    assert_eq!(first.number(), 5_000);
    assert_eq!(reader.info().current_block_number, 5_000);
    assert_eq!(reader.info().start_at_block, -100);

    driver.abort();
}
