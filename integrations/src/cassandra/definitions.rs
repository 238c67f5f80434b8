use integration_sdk::{MetricDefinitions, MetricDefinitionsBuilder, MetricKind, Result};

use MetricKind::{Attribute, Gauge, Rate};

const METRICS: &str = "org.apache.cassandra.metrics";

/// Bean queries covering every node metric below.
pub const NODE_PATTERNS: [&str; 13] = [
    "org.apache.cassandra.metrics:type=ClientRequest,scope=*,name=Latency",
    "org.apache.cassandra.metrics:type=ClientRequest,scope=*,name=Timeouts",
    "org.apache.cassandra.metrics:type=ClientRequest,scope=*,name=Unavailables",
    "org.apache.cassandra.metrics:type=ThreadPools,path=request,scope=*,name=ActiveTasks",
    "org.apache.cassandra.metrics:type=ThreadPools,path=request,scope=*,name=PendingTasks",
    "org.apache.cassandra.metrics:type=ThreadPools,path=internal,scope=*,name=ActiveTasks",
    "org.apache.cassandra.metrics:type=ThreadPools,path=internal,scope=*,name=PendingTasks",
    "org.apache.cassandra.metrics:type=DroppedMessage,scope=*,name=Dropped",
    "org.apache.cassandra.metrics:type=ColumnFamily,name=LiveSSTableCount",
    "org.apache.cassandra.metrics:type=Storage,name=TotalHints",
    "org.apache.cassandra.metrics:type=Storage,name=TotalHintsInProgress",
    "org.apache.cassandra.metrics:type=Cache,scope=*,name=*",
    "org.apache.cassandra.metrics:type=CommitLog,name=*",
];

/// Bean query for the per-table metrics.
pub const TABLE_PATTERN: &str = "org.apache.cassandra.metrics:type=Table,keyspace=*,scope=*,name=*";

const REQUEST_STAGES: [&str; 6] = [
    "CounterMutationStage",
    "MutationStage",
    "ReadRepairStage",
    "ReadStage",
    "RequestResponseStage",
    "ViewMutationStage",
];

const INTERNAL_STAGES: [&str; 14] = [
    "AntiEntropyStage",
    "CacheCleanupExecutor",
    "CompactionExecutor",
    "GossipStage",
    "HintsDispatcher",
    "InternalResponseStage",
    "MemtableFlushWriter",
    "MemtablePostFlush",
    "MemtableReclaimMemory",
    "MigrationStage",
    "MiscStage",
    "PendingRangeCalculator",
    "Sampler",
    "SecondaryIndexManagement",
];

const DROPPED_MESSAGES: [(&str, &str); 11] = [
    ("BatchRemove", "BATCH_REMOVE"),
    ("BatchStore", "BATCH_STORE"),
    ("CounterMutation", "COUNTER_MUTATION"),
    ("Hint", "HINT"),
    ("Mutation", "MUTATION"),
    ("PagedRange", "PAGED_RANGE"),
    ("RangeSlice", "RANGE_SLICE"),
    ("Read", "READ"),
    ("ReadRepair", "READ_REPAIR"),
    ("RequestResponse", "REQUEST_RESPONSE"),
    ("Trace", "_TRACE"),
];

const PERCENTILES: [&str; 6] = ["50th", "75th", "95th", "98th", "99th", "999th"];

fn bean(attributes: &str, attr: &str) -> String {
    format!("{}:{},attr={}", METRICS, attributes, attr)
}

fn client_request(scope: &str, name: &str, attr: &str) -> String {
    bean(&format!("type=ClientRequest,scope={},name={}", scope, name), attr)
}

fn thread_pool(path: &str, scope: &str, name: &str) -> String {
    bean(
        &format!("type=ThreadPools,path={},scope={},name={}", path, scope, name),
        "Value",
    )
}

fn cache(scope: &str, name: &str, attr: &str) -> String {
    bean(&format!("type=Cache,scope={},name={}", scope, name), attr)
}

fn commit_log(name: &str) -> String {
    bean(&format!("type=CommitLog,name={}", name), "Value")
}

fn latencies(mut builder: MetricDefinitionsBuilder) -> MetricDefinitionsBuilder {
    for (prefix, scope) in [
        ("viewWrite", "ViewWrite"),
        ("rangeSlice", "RangeSlice"),
        ("CASWrite", "CASWrite"),
        ("read", "Read"),
        ("CASRead", "CASRead"),
        ("write", "Write"),
    ] {
        builder = builder.key(
            format!("provider.{}LatencyPerSecond", prefix),
            client_request(scope, "Latency", "OneMinuteRate"),
            Gauge,
        );
    }

    for (prefix, scope) in [("write", "Write"), ("read", "Read")] {
        for percentile in PERCENTILES {
            let attr = format!("{}Percentile", percentile);
            builder = builder.key(
                format!("provider.{}Latency{}", prefix, attr),
                client_request(scope, "Latency", &attr),
                Gauge,
            );
        }
    }
    builder
}

fn thread_pools(mut builder: MetricDefinitionsBuilder) -> MetricDefinitionsBuilder {
    let stages = REQUEST_STAGES
        .iter()
        .map(|stage| ("request", stage))
        .chain(INTERNAL_STAGES.iter().map(|stage| ("internal", stage)));

    for (path, stage) in stages {
        for name in ["ActiveTasks", "PendingTasks"] {
            builder = builder.key(
                format!("provider.{}{}{}", path, stage, name),
                thread_pool(path, stage, name),
                Gauge,
            );
        }
    }
    builder
}

fn dropped_messages(mut builder: MetricDefinitionsBuilder) -> MetricDefinitionsBuilder {
    for (name, scope) in DROPPED_MESSAGES {
        builder = builder.key(
            format!("provider.dropped{}MessagesCount", name),
            bean(&format!("type=DroppedMessage,scope={},name=Dropped", scope), "Count"),
            Gauge,
        );
    }
    builder
}

fn caches(builder: MetricDefinitionsBuilder) -> MetricDefinitionsBuilder {
    let key_cache = "KeyCache";
    let row_cache = "RowCache";

    builder
        .key("provider.keyCacheCapacityInBytes", cache(key_cache, "Capacity", "Value"), Gauge)
        .key("provider.keyCacheHitsPerSecond", cache(key_cache, "Hits", "OneMinuteRate"), Gauge)
        .key("provider.keyCacheHitRatio", cache(key_cache, "HitRate", "Value"), Gauge)
        .key("provider.keyCacheRequestsPerSecond", cache(key_cache, "Requests", "OneMinuteRate"), Gauge)
        .key("provider.keyCacheSize", cache(key_cache, "Size", "Value"), Gauge)
        .key("provider.rowCacheCapacityInBytes", cache(row_cache, "Capacity", "Value"), Gauge)
        .key("provider.rowCacheHits", cache(row_cache, "Hits", "OneMinuteRate"), Gauge)
        .key("provider.rowCacheHitRatio", cache(row_cache, "HitRate", "Value"), Gauge)
        .key("provider.rowCacheRequests", cache(row_cache, "Requests", "OneMinuteRate"), Gauge)
        .key("provider.rowCacheSize", cache(row_cache, "Size", "Value"), Gauge)
}

/// Node-level metrics, one record per Cassandra node.
pub fn node_definitions() -> Result<MetricDefinitions> {
    let builder = caches(dropped_messages(thread_pools(latencies(MetricDefinitions::builder()))));

    builder
        .key(
            "provider.liveSSTableCount",
            bean("type=ColumnFamily,name=LiveSSTableCount", "Value"),
            Gauge,
        )
        .key("provider.totalHints", bean("type=Storage,name=TotalHints", "Count"), Gauge)
        .key(
            "provider.totalHintsInProgress",
            bean("type=Storage,name=TotalHintsInProgress", "Count"),
            Gauge,
        )
        .key("provider.readTimeoutsPerSecond", client_request("Read", "Timeouts", "OneMinuteRate"), Gauge)
        .key(
            "provider.readUnavailablesPerSecond",
            client_request("Read", "Unavailables", "OneMinuteRate"),
            Gauge,
        )
        .key("provider.writeTimeoutsPerSecond", client_request("Write", "Timeouts", "OneMinuteRate"), Rate)
        .key(
            "provider.writeUnavailablesPerSecond",
            client_request("Write", "Unavailables", "OneMinuteRate"),
            Gauge,
        )
        .key(
            "provider.rangeSliceTimeoutsPerSecond",
            client_request("RangeSlice", "Timeouts", "OneMinuteRate"),
            Gauge,
        )
        .key(
            "provider.rangeSliceUnavailablesPerSecond",
            client_request("RangeSlice", "Unavailables", "OneMinuteRate"),
            Gauge,
        )
        .key("provider.commitLogCompletedTasksPerSecond", commit_log("CompletedTasks"), Rate)
        .key("provider.commitLogPendingTasks", commit_log("PendingTasks"), Gauge)
        .key("provider.commitLogTotalSize", commit_log("TotalCommitLogSize"), Gauge)
        .build()
}

/// Per keyspace/table metrics. Keys are `<metric name>.<attribute>` of the
/// `type=Table` beans, plus the `keyspace` and `table` labels.
pub fn table_definitions() -> Result<MetricDefinitions> {
    let mut builder = MetricDefinitions::builder()
        .key("provider.keyspace", "keyspace", Attribute)
        .key("provider.table", "table", Attribute)
        .key("provider.keyspaceAndTable", "keyspaceAndTable", Attribute)
        .key("provider.tableReadRequestsPerSecond", "ReadLatency.OneMinuteRate", Gauge)
        .key("provider.tableWriteRequestsPerSecond", "WriteLatency.OneMinuteRate", Gauge)
        .key("provider.tableLiveDiskSpaceUsedBytes", "LiveDiskSpaceUsed.Count", Gauge)
        .key("provider.tableTotalDiskSpaceUsedBytes", "TotalDiskSpaceUsed.Count", Gauge)
        .key("provider.tableLiveSSTableCount", "LiveSSTableCount.Value", Gauge)
        .key("provider.tableEstimatedPartitionCount", "EstimatedPartitionCount.Value", Gauge)
        .key("provider.tablePendingCompactions", "PendingCompactions.Value", Gauge);

    for (prefix, name) in [("Read", "ReadLatency"), ("Write", "WriteLatency")] {
        for percentile in PERCENTILES {
            builder = builder.key(
                format!("provider.table{}Latency{}Percentile", prefix, percentile),
                format!("{}.{}Percentile", name, percentile),
                Gauge,
            );
        }
    }
    builder.build()
}

/// Attributes shared by every record of a run.
pub fn common_definitions() -> Result<MetricDefinitions> {
    MetricDefinitions::builder()
        .key("software.version", "version", Attribute)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use integration_sdk::Source;

    fn source_key(definitions: &MetricDefinitions, name: &str) -> String {
        match &definitions.get(name).unwrap().source {
            Source::Key(key) => key.clone(),
            other => panic!("expected a key source, got {:?}", other),
        }
    }

    #[test]
    fn test_tables_build() {
        assert_eq!(node_definitions().unwrap().len(), 91);
        assert_eq!(table_definitions().unwrap().len(), 22);
        assert_eq!(common_definitions().unwrap().len(), 1);
    }

    #[test]
    fn test_node_bean_keys() {
        let definitions = node_definitions().unwrap();

        assert_eq!(
            source_key(&definitions, "provider.writeLatency999thPercentile"),
            "org.apache.cassandra.metrics:type=ClientRequest,scope=Write,name=Latency,attr=999thPercentile"
        );
        assert_eq!(
            source_key(&definitions, "provider.internalGossipStagePendingTasks"),
            "org.apache.cassandra.metrics:type=ThreadPools,path=internal,scope=GossipStage,name=PendingTasks,attr=Value"
        );
        assert_eq!(
            source_key(&definitions, "provider.droppedTraceMessagesCount"),
            "org.apache.cassandra.metrics:type=DroppedMessage,scope=_TRACE,name=Dropped,attr=Count"
        );
        assert_eq!(
            definitions.get("provider.commitLogCompletedTasksPerSecond").unwrap().kind,
            MetricKind::Rate
        );
    }

    #[test]
    fn test_every_node_bean_is_covered_by_a_pattern() {
        let definitions = node_definitions().unwrap();

        for definition in definitions.iter() {
            let Source::Key(key) = &definition.source else {
                continue;
            };
            let type_attr = key
                .split(',')
                .next()
                .and_then(|first| first.split_once(':'))
                .map(|(_, ty)| ty)
                .unwrap();
            assert!(
                NODE_PATTERNS.iter().any(|pattern| pattern.contains(type_attr)),
                "{} is not queried",
                key
            );
        }
    }
}
