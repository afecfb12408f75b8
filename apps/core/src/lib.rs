pub mod action_executor;
pub mod cache;
pub mod cli;
pub mod config;
pub mod contract;
pub mod core_service;
pub mod debounce;
pub mod detach;
pub mod discovery;
pub mod document_store;
pub mod history;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod package_manager;
pub mod plugin_index;
pub mod plugin_store;
pub mod registry;
pub mod search;
pub mod task_queue;
pub mod transport;
pub mod view_runtime;
pub mod window;

#[cfg(test)]
mod tests {
    mod query_latency_test {
        include!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../tests/perf/query_latency_test.rs"
        ));
    }
}
