use binix_lantern::config::LanternSettings;
use binix_lantern::engine::{LanternEngine, PageModel};
use binix_lantern::graph::GraphBuilder;
use binix_lantern::network::{NetworkAnalysis, NetworkRequestRecord, Priority, ResourceType};
use binix_lantern::simulator::{AssumptionSet, Simulator};
use binix_lantern::trace::{CpuTask, PaintMarkers, ProcessedTrace};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A document fanning out to `n` subresources across a few origins, with a
/// script task after each script
fn synthetic_page(n: usize) -> (Vec<NetworkRequestRecord>, ProcessedTrace) {
    let mut document = NetworkRequestRecord::new("0", "https://a.test/", 0.0);
    document.resource_type = ResourceType::Document;
    document.priority = Priority::VeryHigh;
    document.end_time = 0.2;
    document.transfer_size = 30_000;
    let mut records = vec![document];
    let mut tasks = Vec::new();

    for i in 1..=n {
        let origin = ["a.test", "cdn.test", "img.test"][i % 3];
        let kind = if i % 3 == 0 { ResourceType::Image } else { ResourceType::Script };
        let start = 0.2 + i as f64 * 0.01;
        let mut record = NetworkRequestRecord::new(i.to_string(), format!("https://{}/r{}", origin, i), start);
        record.resource_type = kind;
        record.priority = kind.default_priority();
        record.end_time = start + 0.1;
        record.transfer_size = 20_000 + (i as u64 % 7) * 5_000;
        record.initiator_request_id = Some("0".to_string());
        if kind == ResourceType::Script {
            let task_start = (start + 0.11) * 1_000_000.0 + i as f64 * 15_000.0;
            let mut task = CpuTask::new("EvaluateScript", task_start, task_start + 12_000.0);
            task.resource_urls.push(record.url.clone());
            tasks.push(task);
        }
        records.push(record);
    }
    tasks.sort_by(|a, b| a.start_us.total_cmp(&b.start_us));

    let trace = ProcessedTrace {
        navigation_start_us: 0.0,
        main_pid: 1,
        main_tid: 1,
        tasks,
        markers: PaintMarkers {
            first_paint_us: Some(900_000.0),
            first_contentful_paint_us: Some(900_000.0),
            largest_contentful_paint_us: Some(1_500_000.0),
        },
    };
    (records, trace)
}

/// Benchmark group for graph construction
fn benchmark_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph");

    for n in [50, 300] {
        let (records, trace) = synthetic_page(n);
        group.bench_function(format!("build_{}", n), |b| {
            let builder = GraphBuilder::new();
            b.iter(|| black_box(builder.build(&records, &trace)))
        });
    }

    group.finish();
}

/// Benchmark group for simulation and estimation
fn benchmark_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");
    let (records, trace) = synthetic_page(300);
    let analysis = NetworkAnalysis::analyze(&records);
    let graph = match GraphBuilder::new().build(&records, &trace) {
        Ok(graph) => graph,
        Err(e) => panic!("synthetic page must build: {}", e),
    };
    let settings = LanternSettings::default();

    for assumptions in [AssumptionSet::optimistic(), AssumptionSet::pessimistic()] {
        let simulator = Simulator::new(settings.simulation_options(&assumptions));
        group.bench_function(format!("full_graph_{}", assumptions.estimate.as_str()), |b| {
            b.iter(|| black_box(simulator.simulate(&graph.full_view(), &analysis)))
        });
    }

    group.bench_function("report", |b| {
        let engine = LanternEngine::default();
        let page = match PageModel::from_records(records.clone(), trace.clone(), engine.builder()) {
            Ok(page) => page,
            Err(e) => panic!("synthetic page must build: {}", e),
        };
        b.iter(|| black_box(engine.report(&page)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_graph, benchmark_simulation);
criterion_main!(benches);
