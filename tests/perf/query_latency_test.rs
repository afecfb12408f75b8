use std::time::Instant;

use crate::model::{Cmd, Feature, PluginDescriptor};
use crate::search::{SearchEngine, SearchOptions};

fn p95_ms(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = samples.len().saturating_sub(1);
    let idx = ((last as f64) * 0.95).round() as usize;
    samples[idx.min(last)]
}

fn plugins() -> Vec<PluginDescriptor> {
    let mut plugins: Vec<PluginDescriptor> = (0..200)
        .map(|i| {
            let mut plugin = PluginDescriptor::new(&format!("plugin-{i:03}"));
            plugin.features = (0..10)
                .map(|j| Feature {
                    code: format!("feature-{j}"),
                    explain: String::new(),
                    cmds: vec![Cmd::Label(format!("Document {i:03} part {j}"))],
                })
                .collect();
            plugin
        })
        .collect();

    let mut report = PluginDescriptor::new("report");
    report.features = vec![Feature {
        code: "open".to_string(),
        explain: String::new(),
        cmds: vec![Cmd::Label("Quarterly Report".to_string())],
    }];
    plugins.push(report);
    plugins
}

#[test]
fn warm_query_p95_under_15ms() {
    let mut engine = SearchEngine::new(
        Box::new(plugins),
        SearchOptions {
            match_cache_capacity: 10_000,
            incremental: false,
            ..SearchOptions::default()
        },
    );
    engine.build_index();

    for _ in 0..30 {
        let _ = engine.get_options_from_query("qr", false);
    }

    let mut batch_p95 = Vec::with_capacity(5);
    for _ in 0..5 {
        let mut samples = Vec::with_capacity(80);
        for _ in 0..80 {
            let start = Instant::now();
            let results = engine.get_options_from_query("qr", false);
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
            assert_eq!(results[0].name, "Quarterly Report");
        }
        batch_p95.push(p95_ms(&mut samples));
    }

    batch_p95.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_p95 = batch_p95[batch_p95.len() / 2];

    assert!(
        median_p95 <= 15.0,
        "median batch p95 too high: {median_p95:.3}ms (budget 15.0ms); batches={batch_p95:?}",
    );
}
