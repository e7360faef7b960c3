use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tagscript::{Engine, EngineConfig, ExecutionMode, Queue};

const LOOP_HEAVY: &str = "define total 0\n\
repeat 500 i {\n\
  define sq <{var[i].multiply[<{var[i]}>]}>\n\
  if <{var[sq].modulo[2]}> == 0 {\n\
    define total <{var[total].add[<{var[sq]}>]}>\n\
  } else {\n\
    define total <{var[total].subtract[1]}>\n\
  }\n\
}\n\
echo <{var[total]}>";

const TAG_HEAVY: &str = "define words <{list[alpha|beta|gamma|delta]}>\n\
repeat 200 {\n\
  foreach <{var[words]}> w {\n\
    define u <{var[w].to_upper.append[!].length}>\n\
  }\n\
}";

fn engine(mode: ExecutionMode) -> Engine {
    Engine::new(EngineConfig { execution: mode, ..EngineConfig::default() })
}

fn run_to_end(engine: &Engine, name: &str) -> usize {
    let script = engine.script(name).expect("script loaded");
    let mut q = Queue::new(engine, script);
    q.start();
    q.advance(engine, 0.0);
    q.output().len()
}

fn bench_exec(c: &mut Criterion) {
    let mut g = c.benchmark_group("exec");

    for (label, src) in [("loop_heavy", LOOP_HEAVY), ("tag_heavy", TAG_HEAVY)] {
        for mode in [ExecutionMode::Interpret, ExecutionMode::Compile] {
            let engine = engine(mode);
            engine.load(label, src).expect("parse");
            // Compile once outside the timed loop; the procedure is cached.
            run_to_end(&engine, label);
            g.bench_function(format!("{label}_{mode:?}").to_lowercase(), |b| {
                b.iter(|| run_to_end(black_box(&engine), label))
            });
        }
    }
    g.finish();
}

fn bench_compile(c: &mut Criterion) {
    let engine = engine(ExecutionMode::Compile);
    c.bench_function("compile_loop_heavy", |b| {
        b.iter(|| {
            let script = engine.parse("bench", black_box(LOOP_HEAVY)).expect("parse");
            script.compiled(&engine).len()
        })
    });
}

criterion_group!(benches, bench_exec, bench_compile);
criterion_main!(benches);
