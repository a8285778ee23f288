//! Unit tests for the worker tree.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;

use super::*;

const PATIENCE: Duration = Duration::from_secs(5);

fn poll_until_shutdown(worker: &WorkerContext) {
    while !worker.is_shutdown_requested() {
        thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[rstest]
fn body_runs_on_its_own_named_thread() {
    let (sender, receiver) = mpsc::channel();
    let worker = Worker::builder("named")
        .spawn(move |context| {
            let name = thread::current().name().map(str::to_owned);
            sender
                .send((name, context.label().to_owned()))
                .expect("send thread name");
        })
        .expect("spawn worker");

    worker.join().expect("join worker");
    let (name, label) = receiver.recv().expect("thread name");
    assert_eq!(name, Some(format!("strand-{}", worker.id())));
    assert_eq!(label, "named");
    assert!(worker.is_finished());
}

#[rstest]
#[case(1)]
#[case(4)]
fn shutdown_cascades_to_every_polling_child(#[case] children: usize) {
    let started = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&started);
    let root = Worker::builder("root")
        .spawn(move |context| {
            for index in 0..children {
                let started = Arc::clone(&observed);
                context
                    .child(format!("child-{index}"))
                    .spawn(move |child| {
                        started.fetch_add(1, Ordering::SeqCst);
                        poll_until_shutdown(child);
                    })
                    .expect("spawn child");
            }
            poll_until_shutdown(context);
        })
        .expect("spawn root");

    assert!(wait_for(|| started.load(Ordering::SeqCst) == children));
    assert_eq!(root.child_count(), children);

    root.shutdown();
    root.join().expect("join root");

    assert_eq!(root.child_count(), 0);
    assert!(root.is_finished());
}

#[rstest]
fn parent_waits_for_children_before_finishing() {
    let (release, gate) = mpsc::channel::<()>();
    let gate = Mutex::new(Some(gate));
    let root = Worker::builder("root")
        .spawn(move |context| {
            let gate = gate.lock().expect("gate lock").take().expect("gate");
            context
                .child("slow")
                .spawn(move |_| {
                    gate.recv_timeout(PATIENCE).expect("release child");
                })
                .expect("spawn child");
        })
        .expect("spawn root");

    assert!(!root.wait_timeout(Duration::from_millis(50)));
    assert_eq!(root.child_count(), 1);

    release.send(()).expect("release");
    root.join().expect("join root");
    assert_eq!(root.child_count(), 0);
}

#[rstest]
fn panicking_body_is_reported_and_detached() {
    let root = Worker::builder("root")
        .spawn(|context| {
            let child = context
                .child("doomed")
                .spawn(|_| panic!("boom"))
                .expect("spawn child");
            let error = child.join().expect_err("child panicked");
            assert!(matches!(error, WorkerError::Panicked { ref label } if label == "doomed"));
        })
        .expect("spawn root");

    root.join().expect("root survives a panicking child");
    assert_eq!(root.child_count(), 0);
}

#[rstest]
fn shutdown_hooks_run_once_when_requested() {
    let calls = Arc::new(AtomicUsize::new(0));
    let builder_calls = Arc::clone(&calls);
    let body_calls = Arc::clone(&calls);
    let (ready, registered) = mpsc::channel();
    let worker = Worker::builder("hooked")
        .on_shutdown(move || {
            builder_calls.fetch_add(1, Ordering::SeqCst);
        })
        .spawn(move |context| {
            context.on_shutdown(move || {
                body_calls.fetch_add(1, Ordering::SeqCst);
            });
            ready.send(()).expect("signal registration");
            poll_until_shutdown(context);
        })
        .expect("spawn worker");

    registered.recv_timeout(PATIENCE).expect("hook registered");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    worker.shutdown();
    worker.shutdown();
    worker.join().expect("join worker");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[rstest]
fn hook_registered_after_shutdown_runs_immediately() {
    let worker = Worker::builder("late")
        .spawn(|context| poll_until_shutdown(context))
        .expect("spawn worker");
    worker.shutdown();

    let context = WorkerContext {
        node: Arc::clone(&worker.node),
    };
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    context.on_shutdown(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    worker.join().expect("join worker");
}

#[rstest]
fn child_adopted_after_shutdown_is_flagged() {
    let (sender, receiver) = mpsc::channel();
    let root = Worker::builder("root")
        .spawn(move |context| {
            poll_until_shutdown(context);
            let child = context
                .child("straggler")
                .spawn(|child| poll_until_shutdown(child))
                .expect("spawn child");
            sender
                .send(child.is_shutdown_requested())
                .expect("report child state");
        })
        .expect("spawn root");

    root.shutdown();
    assert!(receiver.recv_timeout(PATIENCE).expect("child state"));
    root.join().expect("join root");
}

#[rstest]
fn parent_side_hook_runs_on_the_calling_thread() {
    let caller = thread::current().id();
    let (release, gate) = mpsc::channel::<()>();
    let (worker, observed) = Worker::builder("hooked")
        .spawn_with_hook(
            move |_| {
                gate.recv_timeout(PATIENCE).expect("release body");
            },
            |worker| (thread::current().id(), worker.is_finished()),
        )
        .expect("spawn worker");

    assert_eq!(observed, (caller, false));
    release.send(()).expect("release");
    worker.join().expect("join worker");
}

#[rstest]
fn joining_from_the_worker_itself_is_rejected() {
    let (sender, receiver) = mpsc::channel();
    let worker = Worker::builder("selfish")
        .spawn(move |context| {
            // Wait until the parent side has stored the join handle.
            while lock(&context.node.thread).is_none() {
                thread::sleep(Duration::from_millis(1));
            }
            sender
                .send(context.handle().join())
                .expect("report join result");
        })
        .expect("spawn worker");

    let outcome = receiver.recv_timeout(PATIENCE).expect("join result");
    assert!(matches!(outcome, Err(WorkerError::JoinSelf { .. })));
    worker.join().expect("outer join");
}

#[rstest]
fn relay_inherits_parent_label_and_parentage() {
    let (sender, receiver) = mpsc::channel();
    let root = Worker::builder("tcp://127.0.0.1:9780")
        .spawn(move |context| {
            let parent = context.id();
            let dispatcher = Arc::new(move |relay: &WorkerContext, value: u8| {
                sender
                    .send((value, relay.label().to_owned(), relay.id() != parent))
                    .expect("report relay");
            });
            ThreadRelay::spawn(context, 7_u8, dispatcher).expect("spawn relay");
        })
        .expect("spawn root");

    root.join().expect("join root");
    let (value, label, distinct) = receiver.recv().expect("relay report");
    assert_eq!(value, 7);
    assert_eq!(label, "tcp://127.0.0.1:9780");
    assert!(distinct);
}
