//! Promotion of a function shared by VMs on several threads
//!
//! Loop records live in the loaded function, so however many threads reach
//! the threshold at once, exactly one compilation is installed.

use std::sync::Arc;
use std::thread;

use basalt_cli::demos;
use core_types::{LoopState, TaggedValue};
use integration_tests::shared_backend;
use interpreter::{JitEventLog, LoopCompiler, Vm, VmConfig};

const THREADS: usize = 4;

#[test]
fn test_shared_function_compiles_once() {
    let backend = shared_backend();
    let events = JitEventLog::new();
    let config = VmConfig::default().with_threshold(200);

    let compiler: Arc<dyn LoopCompiler> = backend.clone();
    let mut loader = Vm::with_event_log(config.clone(), Some(compiler.clone()), events.clone());
    let function = loader.load(demos::sum_below(20_000)).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let function = Arc::clone(&function);
            let compiler = compiler.clone();
            let events = events.clone();
            let config = config.clone();
            thread::spawn(move || {
                let mut vm = Vm::with_event_log(config, Some(compiler), events);
                vm.execute(&function, &[]).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), TaggedValue::Int(199_990_000));
    }

    assert_eq!(backend.compiled_count(), 1);
    assert_eq!(events.compiled_count(), 1);
    assert_eq!(
        function.existing_record(3).unwrap().state(),
        LoopState::Installed
    );
}

#[test]
fn test_threads_reuse_installed_code() {
    let backend = shared_backend();
    let config = VmConfig::default().with_threshold(50);

    let mut first = Vm::with_compiler(config.clone(), backend.clone());
    let function = first.load(demos::sum_below(1_000)).unwrap();
    assert_eq!(first.execute(&function, &[]).unwrap(), TaggedValue::Int(499_500));

    let shared = Arc::clone(&function);
    let second = thread::spawn(move || {
        let mut vm = Vm::with_config(config);
        vm.execute(&shared, &[]).unwrap()
    });
    assert_eq!(second.join().unwrap(), TaggedValue::Int(499_500));
    assert_eq!(backend.compiled_count(), 1);
}
