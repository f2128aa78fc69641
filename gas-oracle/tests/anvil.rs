//! End to end test against a local anvil node
//!
//! Requires `anvil` on the `PATH`; run with `cargo test -- --ignored`.

use std::time::Duration;

use alloy::node_bindings::Anvil;
use gas_oracle::{GasOracle, OracleConfig, PriceSource};

#[tokio::test]
#[ignore]
async fn test_live_node_serves_fresh_price() {
    let anvil = Anvil::new().block_time(1).spawn();

    let oracle = GasOracle::connect(OracleConfig::new(anvil.ws_endpoint())).await.unwrap();
    assert_eq!(oracle.chain_id(), anvil.chain_id());
    assert_eq!(oracle.price_source(), PriceSource::NodeEstimate);

    oracle.start().await.unwrap();
    let observed_at = oracle.cache().observed_at_ms().unwrap();

    // Wait for at least one block-driven refresh
    let refreshed = tokio::time::timeout(Duration::from_secs(10), async {
        while oracle.cache().observed_at_ms() == Some(observed_at) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;

    assert!(refreshed.is_ok());
    assert!(oracle.get_gas_price() > 0);
    oracle.close().await;
}
