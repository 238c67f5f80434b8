use integration_sdk::{MetricDefinitions, MetricDefinitionsBuilder, MetricKind, RawBag, Result};

use MetricKind::{Attribute, Gauge, Rate};

fn table(entries: &[(&str, &str, MetricKind)]) -> MetricDefinitionsBuilder {
    entries
        .iter()
        .fold(MetricDefinitions::builder(), |builder, (name, key, kind)| {
            builder.key(*name, *key, *kind)
        })
}

pub fn default_definitions() -> Result<MetricDefinitions> {
    table(&[
        ("provider.abortedClientsPerSecond", "Aborted_clients", Rate),
        ("provider.abortedConnectsPerSecond", "Aborted_connects", Rate),
        ("provider.bytesReceivedPerSecond", "Bytes_received", Rate),
        ("provider.bytesSentPerSecond", "Bytes_sent", Rate),
        ("provider.comDeletePerSecond", "Com_delete", Rate),
        ("provider.comDeleteMultiPerSecond", "Com_delete_multi", Rate),
        ("provider.comInsertPerSecond", "Com_insert", Rate),
        ("provider.comInsertSelectPerSecond", "Com_insert_select", Rate),
        ("provider.comReplaceSelectPerSecond", "Com_replace_select", Rate),
        ("provider.comSelectPerSecond", "Com_select", Rate),
        ("provider.comUpdatePerSecond", "Com_update", Rate),
        ("provider.comUpdateMultiPerSecond", "Com_update_multi", Rate),
        ("provider.connectionErrorsMaxConnectionsPerSecond", "Connection_errors_max_connections", Rate),
        ("provider.connectionsPerSecond", "Connections", Rate),
        ("provider.handlerRollbackPerSecond", "Handler_rollback", Rate),
        ("provider.innodbBufferPoolPagesData", "Innodb_buffer_pool_pages_data", Gauge),
        ("provider.innodbBufferPoolPagesFree", "Innodb_buffer_pool_pages_free", Gauge),
        ("provider.innodbBufferPoolPagesTotal", "Innodb_buffer_pool_pages_total", Gauge),
        ("provider.innodbDataReadPerSecond", "Innodb_data_read", Rate),
        ("provider.innodbDataWrittenPerSecond", "Innodb_data_written", Rate),
        ("provider.innodbLogWaitsPerSecond", "Innodb_log_waits", Rate),
        ("provider.innodbRowLockCurrentWaits", "Innodb_row_lock_current_waits", Gauge),
        ("provider.innodbRowLockTimeAvg", "Innodb_row_lock_time_avg", Gauge),
        ("provider.innodbRowLockWaitsPerSecond", "Innodb_row_lock_waits", Rate),
        ("provider.maxConnections", "Max_used_connections", Gauge),
        ("provider.openFiles", "Open_files", Gauge),
        ("provider.openTables", "Open_tables", Gauge),
        ("provider.openedTablesPerSecond", "Opened_tables", Rate),
        ("provider.preparedStmtCountPerSecond", "Prepared_stmt_count", Rate),
        ("provider.qCacheFreeMemory", "Qcache_free_memory", Gauge),
        ("provider.qCacheNotCachedPerSecond", "Qcache_not_cached", Rate),
        ("provider.queriesPerSecond", "Queries", Rate),
        ("provider.questionsPerSecond", "Questions", Rate),
        ("provider.slowQueriesPerSecond", "Slow_queries", Rate),
        ("provider.tablesLocksWaitedPerSecond", "Table_locks_waited", Rate),
        ("provider.threadsConnected", "Threads_connected", Gauge),
        ("provider.threadsRunning", "Threads_running", Gauge),
        ("software.Edition", "version_comment", Attribute),
        ("software.Version", "version", Attribute),
        ("cluster.NodeType", "node_type", Attribute),
    ])
    .derived("provider.qCacheUtilization", query_cache_utilization, Gauge)
    .derived("provider.qCacheHitRatio", query_cache_hit_ratio, Gauge)
    .build()
}

pub fn extended_definitions() -> Result<MetricDefinitions> {
    table(&[
        ("provider.createdTmpDiskTablesPerSecond", "Created_tmp_disk_tables", Rate),
        ("provider.createdTmpFilesPerSecond", "Created_tmp_files", Rate),
        ("provider.createdTmpTablesPerSecond", "Created_tmp_tables", Rate),
        ("provider.handlerDeletePerSecond", "Handler_delete", Rate),
        ("provider.handlerReadFirstPerSecond", "Handler_read_first", Rate),
        ("provider.handlerReadKeyPerSecond", "Handler_read_key", Rate),
        ("provider.handlerReadRndPerSecond", "Handler_read_rnd", Rate),
        ("provider.handlerReadRndNextPerSecond", "Handler_read_rnd_next", Rate),
        ("provider.handlerUpdatePerSecond", "Handler_update", Rate),
        ("provider.handlerWritePerSecond", "Handler_write", Rate),
        ("provider.maxExecutionTimeExceededPerSecond", "Max_execution_time_exceeded", Rate),
        ("provider.qCacheFreeBlocks", "Qcache_free_blocks", Gauge),
        ("provider.qCacheHitsPerSecond", "Qcache_hits", Rate),
        ("provider.qCacheInserts", "Qcache_inserts", Gauge),
        ("provider.qCacheLowmemPrunesPerSecond", "Qcache_lowmem_prunes", Rate),
        ("provider.qCacheQueriesInCachePerSecond", "Qcache_queries_in_cache", Rate),
        ("provider.qCacheTotalBlocks", "Qcache_total_blocks", Gauge),
        ("provider.selectFullJoinPerSecond", "Select_full_join", Rate),
        ("provider.selectFullJoinRangePerSecond", "Select_full_range_join", Rate),
        ("provider.selectRangePerSecond", "Select_range", Rate),
        ("provider.selectRangeCheckPerSecond", "Select_range_check", Rate),
        ("provider.sortMergePassesPerSecond", "Sort_merge_passes", Rate),
        ("provider.sortRangePerSecond", "Sort_range", Rate),
        ("provider.sortRowsPerSecond", "Sort_rows", Rate),
        ("provider.sortScanPerSecond", "Sort_scan", Rate),
        ("provider.tableOpenCacheHitsPerSecond", "Table_open_cache_hits", Rate),
        ("provider.tableOpenCacheMissesPerSecond", "Table_open_cache_misses", Rate),
        ("provider.tableOpenCacheOverflowsPerSecond", "Table_open_cache_overflows", Rate),
        ("provider.threadsCached", "Threads_cached", Gauge),
        ("provider.threadsCreatedPerSecond", "Threads_created", Rate),
    ])
    .derived("provider.threadCacheMissRate", thread_cache_miss_rate, Gauge)
    .build()
}

pub fn innodb_definitions() -> Result<MetricDefinitions> {
    table(&[
        ("provider.innodbBufferPoolPagesDirty", "Innodb_buffer_pool_pages_dirty", Gauge),
        ("provider.innodbBufferPoolPagesFlushedPerSecond", "Innodb_buffer_pool_pages_flushed", Rate),
        ("provider.innodbBufferPoolReadAheadPerSecond", "Innodb_buffer_pool_read_ahead", Rate),
        ("provider.innodbBufferPoolReadAheadEvictedPerSecond", "Innodb_buffer_pool_read_ahead_evicted", Rate),
        ("provider.innodbBufferPoolReadAheadRndPerSecond", "Innodb_buffer_pool_read_ahead_rnd", Rate),
        ("provider.innodbBufferPoolReadRequestsPerSecond", "Innodb_buffer_pool_read_requests", Rate),
        ("provider.innodbBufferPoolReads", "Innodb_buffer_pool_reads", Gauge),
        ("provider.innodbBufferPoolWaitFreePerSecond", "Innodb_buffer_pool_wait_free", Rate),
        ("provider.innodbBufferPoolWriteRequestsPerSecond", "Innodb_buffer_pool_write_requests", Rate),
        ("provider.innodbDataFsyncsPerSecond", "Innodb_data_fsyncs", Rate),
        ("provider.innodbDataPendingFsyncsPerSecond", "Innodb_data_pending_fsyncs", Rate),
        ("provider.innodbDataPendingReadsPerSecond", "Innodb_data_pending_reads", Rate),
        ("provider.innodbDataPendingWritesPerSecond", "Innodb_data_pending_writes", Rate),
        ("provider.innodbDataReadsPerSecond", "Innodb_data_reads", Rate),
        ("provider.innodbDataWritesPerSecond", "Innodb_data_writes", Rate),
        ("provider.innodbLogWriteRequestsPerSecond", "Innodb_log_write_requests", Rate),
        ("provider.innodbWritesPerSecond", "Innodb_log_writes", Rate),
        ("provider.innodbNumOpenFiles", "Innodb_num_open_files", Gauge),
        ("provider.innodbOsLogFsyncsPerSecond", "Innodb_os_log_fsyncs", Rate),
        ("provider.innodbOsLogPendingFsyncsPerSecond", "Innodb_os_log_pending_fsyncs", Rate),
        ("provider.innodbOsLogPendingWritesPerSecond", "Innodb_os_log_pending_writes", Rate),
        ("provider.innodbOsLogWrittenPerSecond", "Innodb_os_log_written", Rate),
        ("provider.innodbPagesCreatedPerSecond", "Innodb_pages_created", Rate),
        ("provider.innodbPagesReadPerSecond", "Innodb_pages_read", Rate),
        ("provider.innodbPagesWrittenPerSecond", "Innodb_pages_written", Rate),
        ("provider.innodbRowsDeletedPerSecond", "Innodb_rows_deleted", Rate),
        ("provider.innodbRowsInsertedPerSecond", "Innodb_rows_inserted", Rate),
        ("provider.innodbRowsReadPerSecond", "Innodb_rows_read", Rate),
        ("provider.innodbRowsUpdatedPerSecond", "Innodb_rows_updated", Rate),
    ])
    .build()
}

pub fn myisam_definitions() -> Result<MetricDefinitions> {
    table(&[
        ("provider.keyBlocksNotFlushed", "Key_blocks_not_flushed", Gauge),
        ("provider.keyReadRequestsPerSecond", "Key_read_requests", Rate),
        ("provider.KeyReadsPerSecond", "Key_reads", Rate),
        ("provider.KeyWriteRequestsPerSecond", "Key_write_requests", Rate),
        ("provider.KeyWritesPerSecond", "Key_writes", Rate),
    ])
    .derived("provider.keyCacheUtilization", key_cache_utilization, Gauge)
    .build()
}

/// `numerator / denominator` for two integer counters, undefined when the
/// denominator is zero.
fn ratio(raw: &RawBag, numerator: &str, denominator: &str) -> Option<f64> {
    let numerator = raw.get_int(numerator)?;
    let denominator = raw.get_int(denominator)?;
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64)
}

fn query_cache_utilization(raw: &RawBag) -> Option<f64> {
    ratio(raw, "Qcache_free_blocks", "Qcache_total_blocks").map(|free| 1.0 - free)
}

fn query_cache_hit_ratio(raw: &RawBag) -> Option<f64> {
    ratio(raw, "Qcache_hits", "Queries")
}

fn thread_cache_miss_rate(raw: &RawBag) -> Option<f64> {
    ratio(raw, "Threads_created", "Connections")
}

fn key_cache_utilization(raw: &RawBag) -> Option<f64> {
    let unused_blocks = raw.get_int("Key_blocks_unused")? as f64;
    let block_size = raw.get_int("key_cache_block_size")? as f64;
    let buffer_size = raw.get_int("key_buffer_size")?;
    if buffer_size == 0 {
        return None;
    }
    Some(1.0 - unused_blocks * block_size / buffer_size as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use integration_sdk::RawValue;

    fn bag(entries: &[(&str, i64)]) -> RawBag {
        entries.iter().map(|(k, v)| (*k, RawValue::Int(*v))).collect()
    }

    #[test]
    fn test_tables_build() {
        assert!(default_definitions().unwrap().len() > 40);
        assert_eq!(extended_definitions().unwrap().len(), 31);
        assert_eq!(innodb_definitions().unwrap().len(), 29);
        assert_eq!(myisam_definitions().unwrap().len(), 6);
    }

    #[test]
    fn test_query_cache_utilization() {
        let raw = bag(&[("Qcache_free_blocks", 1), ("Qcache_total_blocks", 4)]);
        assert_eq!(query_cache_utilization(&raw), Some(0.75));
    }

    #[test]
    fn test_ratios_with_zero_denominator_are_missing() {
        let raw = bag(&[("Qcache_hits", 3), ("Queries", 0)]);
        assert_eq!(query_cache_hit_ratio(&raw), None);
    }

    #[test]
    fn test_thread_cache_miss_rate() {
        let raw = bag(&[("Threads_created", 5), ("Connections", 20)]);
        assert_eq!(thread_cache_miss_rate(&raw), Some(0.25));
    }

    #[test]
    fn test_key_cache_utilization() {
        let raw = bag(&[
            ("Key_blocks_unused", 6),
            ("key_cache_block_size", 1024),
            ("key_buffer_size", 8192),
        ]);
        assert_eq!(key_cache_utilization(&raw), Some(0.25));

        let text: RawBag = [("Key_blocks_unused", RawValue::from("six"))].into_iter().collect();
        assert_eq!(key_cache_utilization(&text), None);
    }
}
