use coalescent::{simulate, tabulate, BranchTable};
use criterion::{criterion_group, criterion_main, Criterion};
use network::{PopulationDag, TipSet};
use params::{ParamCategory, ParamDecl, ParameterStore};

fn three_tip_network() -> (PopulationDag, ParameterStore, network::SegHandle) {
    let fixed = vec![
        ParamDecl{name: "twoN".into(), value: 1.0, lo: 0.0, hi: f64::INFINITY, category: ParamCategory::PopSize},
        ParamDecl{name: "t_leaf".into(), value: 0.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
        ParamDecl{name: "t1".into(), value: 1.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
        ParamDecl{name: "t2".into(), value: 2.0, lo: 0.0, hi: 10.0, category: ParamCategory::Time},
    ];
    let params = ParameterStore::new(&fixed, &[], &[]).unwrap();
    let twon = params.handle_of("twoN").unwrap();
    let t_leaf = params.handle_of("t_leaf").unwrap();
    let t1 = params.handle_of("t1").unwrap();
    let t2 = params.handle_of("t2").unwrap();

    let mut dag = PopulationDag::new();
    let x = dag.add_segment("x", twon, t_leaf, vec![0]).unwrap();
    let y = dag.add_segment("y", twon, t_leaf, vec![1]).unwrap();
    let z = dag.add_segment("z", twon, t_leaf, vec![2]).unwrap();
    let xy = dag.add_segment("xy", twon, t1, vec![]).unwrap();
    let xyz = dag.add_segment("xyz", twon, t2, vec![]).unwrap();
    dag.add_child(xy, x, &params).unwrap();
    dag.add_child(xy, y, &params).unwrap();
    dag.add_child(xyz, xy, &params).unwrap();
    dag.add_child(xyz, z, &params).unwrap();
    (dag, params, xyz)
}

fn bench_replicates(c: &mut Criterion) {
    let (dag, params, root) = three_tip_network();
    let universe = TipSet(0b111);
    c.bench_function("coalescent/three_tip_replicate", |b| {
        b.iter(|| {
            let mut rng = fastrand::Rng::with_seed(1);
            let mut table = BranchTable::new();
            for _ in 0..1_000 {
                let tree = simulate(&dag, &params, root, &mut rng).unwrap();
                tabulate(&tree, universe, false, &mut table);
            }
            std::hint::black_box(&table);
        });
    });
}

criterion_group!(benches, bench_replicates);
criterion_main!(benches);
