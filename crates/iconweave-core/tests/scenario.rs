//! Offline, no persistent store: parallel requests collapse to one attempt
//! and both callers get the fallback glyph.

use std::sync::Arc;

use iconweave_core::domain::{AssetKey, DeclarationValue, FALLBACK_SVG, FetchError};
use iconweave_core::impls::{MemoryChannelProvider, ScriptedFetcher, StaticNetwork};
use iconweave_core::{AssetPipeline, PipelineConfig};

#[tokio::test(start_paused = true)]
async fn offline_parallel_requests_share_one_attempt_and_fall_back() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.fail("http://localhost/icons/duotone/folder.svg", FetchError::Offline);
    let network = Arc::new(StaticNetwork::offline());
    let channels = Arc::new(MemoryChannelProvider::new());
    let pipeline = Arc::new(
        AssetPipeline::builder(PipelineConfig::default())
            .fetcher(fetcher.clone())
            .network(network)
            .channels(channels.clone())
            .build()
            .unwrap(),
    );

    let (a, b) = tokio::join!(
        pipeline.request("folder", "duotone", 48.0),
        pipeline.request("folder", "duotone", 48.0)
    );

    for value in [&a, &b] {
        let DeclarationValue::Url(rep) = value else {
            panic!("expected url, got {value:?}");
        };
        assert_eq!(rep.decode_inline().unwrap(), FALLBACK_SVG.as_bytes());
    }
    assert_eq!(fetcher.call_count(), 1);

    let counts = pipeline.counts();
    assert_eq!(counts.network_fetches, 1);
    assert_eq!(counts.retries_scheduled, 1);
    assert_eq!(counts.offline_drops, 1);
    assert_eq!(counts.fallbacks, 1);

    pipeline.flush();
    let key = AssetKey::new("folder", "duotone", 48.0);
    assert!(pipeline.registry().is_committed(&key.to_string()));
    assert!(pipeline.registry().is_placeholder(&key.to_string()));
    assert!(!pipeline.has_rule("folder", "duotone", 64));
    assert_eq!(channels.current().unwrap().len(), 1);
}
