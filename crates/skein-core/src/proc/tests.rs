//! Driver scenarios against an in-memory environment.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rstest::rstest;
use tokio::task::LocalSet;

use crate::app::{Runtime, RuntimeBuilder};
use crate::domain::{CancelHook, CpsRoutine, Keyed, LocalFuture, Message, Outcome, Routine, Value};
use crate::effects;
use crate::error::SagaError;
use crate::impls::{EffectStatus, MemoryEnv, RecordingMonitor};
use crate::proc::Task;
use crate::workflow::{Interrupt, Resume, Step};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

fn runtime(env: &Rc<MemoryEnv>) -> Runtime {
    RuntimeBuilder::new(env.clone()).build().unwrap()
}

/// Never calls back; records every cancellation of its pending work.
fn pending_cps(tag: &'static str, hits: &Log) -> CpsRoutine {
    let hits = Rc::clone(hits);
    CpsRoutine::new(tag, move |_, _done| {
        let hits = Rc::clone(&hits);
        let hook: CancelHook = Box::new(move || hits.borrow_mut().push(format!("cancel:{tag}")));
        Ok(Some(hook))
    })
}

fn failing(message: &'static str) -> Routine {
    Routine::sync("failing", move |_| Err(SagaError::workflow(message)))
}

/// Waits for `kind`, records it, then parks until cancelled.
fn parked(log: &Log, tag: &'static str) -> Routine {
    let log = Rc::clone(log);
    Routine::saga(tag, move |cx, args| {
        let log = Rc::clone(&log);
        async move {
            let id = args
                .last()
                .and_then(Value::as_message)
                .and_then(|m| m.payload().as_i64())
                .unwrap_or(0);
            log.borrow_mut().push(format!("{tag}:start:{id}"));
            match cx.take("NEVER").await {
                Err(Interrupt::Cancelled) => {
                    log.borrow_mut().push(format!("{tag}:cancel:{id}"));
                    Err(Interrupt::Cancelled)
                }
                other => other.map(Value::from),
            }
        }
    })
}

#[test]
fn forked_taker_sees_put_from_parent() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let seen = log();

    let worker = {
        let seen = Rc::clone(&seen);
        Routine::saga("worker", move |cx, _| {
            let seen = Rc::clone(&seen);
            async move {
                let ping = cx.take("PING").await?;
                seen.borrow_mut().push(ping.kind().to_string());
                cx.put(Message::new("PONG")).await?;
                Ok(Value::Unit)
            }
        })
    };
    let root = Routine::saga("root", move |cx, _| {
        let worker = worker.clone();
        async move {
            cx.fork(&worker, vec![]).await?;
            cx.put(Message::new("PING")).await?;
            Ok(Value::data(1))
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(entries(&seen), vec!["PING"]);
    assert_eq!(env.dispatched(), vec![Message::new("PING"), Message::new("PONG")]);
    assert!(!task.is_running());
    assert_eq!(task.result().and_then(|v| v.as_i64()), Some(1));
}

#[test]
fn fork_prelude_put_reaches_the_parents_take() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let child = Routine::saga("child", |cx, _| async move {
        cx.put(Message::new("M")).await?;
        Ok(Value::Unit)
    });
    let root = Routine::saga("root", move |cx, _| {
        let child = child.clone();
        async move {
            cx.fork(&child, vec![]).await?;
            let m = cx.take("M").await?;
            Ok(Value::data(m.kind()))
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert!(!task.is_running());
    assert_eq!(task.result().and_then(|v| v.as_str().map(str::to_owned)), Some("M".into()));
}

#[test]
fn long_synchronous_loop_runs_in_flat_stack() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let one = Routine::sync("one", |_| Ok(Value::data(1)));

    let root = Routine::saga("root", move |cx, _| {
        let one = one.clone();
        async move {
            let mut count = 0;
            for i in 0..120_000 {
                let ok = match i % 3 {
                    0 => !cx.cancelled().await?,
                    1 => cx.get_context("missing").await?.is_unit(),
                    _ => cx.call(&one, vec![]).await?.as_i64() == Some(1),
                };
                if ok {
                    count += 1;
                }
            }
            Ok(Value::data(count))
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert!(!task.is_running());
    assert_eq!(task.result().and_then(|v| v.as_i64()), Some(120_000));
}

#[test]
fn parent_waits_for_attached_forks() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let child = Routine::saga("child", |cx, _| async move {
        cx.take("GO").await?;
        Ok(Value::Unit)
    });
    let root = Routine::saga("root", move |cx, _| {
        let child = child.clone();
        async move {
            cx.fork(&child, vec![]).await?;
            Ok(Value::data("main"))
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert!(task.is_running());
    env.emit(Message::new("GO")).unwrap();
    assert!(!task.is_running());
    assert_eq!(task.result().and_then(|v| v.as_str().map(str::to_owned)), Some("main".into()));
}

#[test]
fn join_resumes_with_child_result() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let child = Routine::saga("child", |cx, _| async move {
        cx.take("GO").await?;
        Ok(Value::data(7))
    });
    let root = Routine::saga("root", move |cx, _| {
        let child = child.clone();
        async move {
            let task = cx.fork(&child, vec![]).await?;
            let value = cx.join(&task).await?;
            Ok(Value::data(value.as_i64().unwrap_or(0) + 1))
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    env.emit(Message::new("GO")).unwrap();
    assert_eq!(task.result().and_then(|v| v.as_i64()), Some(8));
}

#[test]
fn call_error_is_catchable() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let root = Routine::saga("root", |cx, _| async move {
        match cx.call(&failing("boom"), vec![]).await {
            Err(Interrupt::Failed(e)) => Ok(Value::data(format!("caught {e}"))),
            other => other,
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(
        task.result().and_then(|v| v.as_str().map(str::to_owned)),
        Some("caught boom".into())
    );
    assert!(!task.is_aborted());
}

#[test]
fn uncaught_error_reaches_the_hook_once() {
    let env = Rc::new(MemoryEnv::new());
    let errors = log();
    let hook = Rc::clone(&errors);
    let rt = RuntimeBuilder::new(env.clone())
        .on_error(move |e| hook.borrow_mut().push(e.to_string()))
        .build()
        .unwrap();

    let sibling = log();
    let parked = parked(&sibling, "sibling");
    let root = Routine::saga("root", move |cx, _| {
        let parked = parked.clone();
        async move {
            cx.fork(&parked, vec![]).await?;
            cx.fork(&failing("boom"), vec![]).await?;
            Ok(Value::Unit)
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(entries(&errors), vec!["boom"]);
    assert!(task.is_aborted());
    assert_eq!(task.error(), Some(SagaError::workflow("boom")));
    assert_eq!(entries(&sibling), vec!["sibling:start:0", "sibling:cancel:0"]);
}

#[test]
fn spawned_task_fails_on_its_own() {
    let env = Rc::new(MemoryEnv::new());
    let errors = log();
    let hook = Rc::clone(&errors);
    let rt = RuntimeBuilder::new(env.clone())
        .on_error(move |e| hook.borrow_mut().push(e.to_string()))
        .build()
        .unwrap();

    let root = Routine::saga("root", |cx, _| async move {
        let task = cx.spawn(&failing("detached"), vec![]).await?;
        Ok(Value::data(task.is_aborted()))
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(entries(&errors), vec!["detached"]);
    assert!(!task.is_aborted());
    assert_eq!(task.result().and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn cancel_cascades_to_forks() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let trace = log();
    let children: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));

    let a = parked(&trace, "a");
    let b = parked(&trace, "b");
    let slot = Rc::clone(&children);
    let root = Routine::saga("root", move |cx, _| {
        let (a, b, slot) = (a.clone(), b.clone(), Rc::clone(&slot));
        async move {
            let first = cx.fork(&a, vec![]).await?;
            let second = cx.fork(&b, vec![]).await?;
            slot.borrow_mut().extend([first, second]);
            cx.take("NEVER").await?;
            Ok(Value::Unit)
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    task.cancel();
    task.cancel();

    assert!(task.is_cancelled());
    assert!(!task.is_running());
    assert!(task.result().is_some_and(|v| v.is_cancelled()));
    for child in children.borrow().iter() {
        assert!(child.is_cancelled());
        assert!(!child.is_running());
    }
    assert_eq!(
        entries(&trace),
        vec!["a:start:0", "b:start:0", "a:cancel:0", "b:cancel:0"]
    );
}

#[test]
fn cleanup_sees_cancelled_flag() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let root = Routine::saga("root", |cx, _| async move {
        match cx.take("NEVER").await {
            Err(Interrupt::Cancelled) => {
                let flag = cx.cancelled().await?;
                cx.put(Message::new(if flag { "CLEANUP" } else { "WRONG" }))
                    .await?;
                Err(Interrupt::Cancelled)
            }
            other => other.map(Value::from),
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    task.cancel();
    assert_eq!(env.dispatched_kinds(), vec!["CLEANUP"]);
}

#[test]
fn take_latest_cancels_previous_worker_first() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let trace = log();

    let worker = parked(&trace, "h");
    let root = Routine::saga("root", move |cx, _| {
        let worker = worker.clone();
        async move {
            cx.run(effects::take_latest("FETCH", &worker, vec![])).await?;
            Ok(Value::Unit)
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    env.emit(Message::with_payload("FETCH", 1.into())).unwrap();
    env.emit(Message::with_payload("FETCH", 2.into())).unwrap();
    assert_eq!(entries(&trace), vec!["h:start:1", "h:cancel:1", "h:start:2"]);

    task.cancel();
    assert_eq!(
        entries(&trace),
        vec!["h:start:1", "h:cancel:1", "h:start:2", "h:cancel:2"]
    );
}

#[test]
fn take_every_keeps_every_worker() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let trace = log();

    let worker = parked(&trace, "h");
    let root = Routine::saga("root", move |cx, _| {
        let worker = worker.clone();
        async move {
            cx.run(effects::take_every("FETCH", &worker, vec![])).await?;
            Ok(Value::Unit)
        }
    });

    rt.run(&root, vec![]).unwrap();
    env.emit(Message::with_payload("FETCH", 1.into())).unwrap();
    env.emit(Message::new("OTHER")).unwrap();
    env.emit(Message::with_payload("FETCH", 2.into())).unwrap();
    assert_eq!(entries(&trace), vec!["h:start:1", "h:start:2"]);
}

#[test]
fn end_terminates_waiting_takes() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let plain = Routine::saga("plain", |cx, _| async move {
        cx.take("X").await?;
        Ok(Value::data("unreachable"))
    });
    let maybe = Routine::saga("maybe", |cx, _| async move {
        let message = cx.take_maybe("X").await?;
        Ok(Value::data(message.is_end()))
    });

    let plain = rt.run(&plain, vec![]).unwrap();
    let maybe = rt.run(&maybe, vec![]).unwrap();
    env.emit(Message::end()).unwrap();

    assert!(!plain.is_running());
    assert!(plain.result().is_some_and(|v| v.is_unit()));
    assert_eq!(maybe.result().and_then(|v| v.as_bool()), Some(true));
    assert_eq!(env.listener_count(), 0);
}

#[rstest]
#[case::list(Keyed::list([effects::call(&Routine::sync("one", |_| Ok(Value::data(1))), vec![]), effects::call(&Routine::sync("two", |_| Ok(Value::data(2))), vec![])]), "0")]
#[case::record(Keyed::record([("x", effects::call(&Routine::sync("one", |_| Ok(Value::data(1))), vec![])), ("y", effects::call(&Routine::sync("two", |_| Ok(Value::data(2))), vec![]))]), "x")]
fn all_collects_in_shape(#[case] keyed: Keyed, #[case] first: &str) {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let keyed = RefCell::new(Some(keyed));
    let keyed = Rc::new(keyed);

    let root = Routine::saga("root", move |cx, _| {
        let keyed = keyed.borrow_mut().take();
        async move {
            match keyed {
                Some(keyed) => cx.all(keyed).await,
                None => Ok(Value::Unit),
            }
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    let result = task.result().unwrap_or_default();
    assert_eq!(result.get(first).and_then(Value::as_i64), Some(1));
}

#[test]
fn all_fails_fast_and_cancels_the_rest() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let root = Routine::saga("root", |cx, _| async move {
        let outcome = cx
            .all(Keyed::list([
                effects::take("NEVER"),
                effects::call(&failing("boom"), vec![]),
            ]))
            .await;
        match outcome {
            Err(Interrupt::Failed(e)) => Ok(Value::data(e.to_string())),
            other => other,
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(
        task.result().and_then(|v| v.as_str().map(str::to_owned)),
        Some("boom".into())
    );
}

#[test]
fn all_cancels_each_loser_once() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let hits = log();
    let resumed = log();

    let (p, q) = (pending_cps("p", &hits), pending_cps("q", &hits));
    let seen = Rc::clone(&resumed);
    let root = Routine::saga("root", move |cx, _| {
        let (p, q, seen) = (p.clone(), q.clone(), Rc::clone(&seen));
        async move {
            let outcome = cx
                .all(Keyed::list([
                    effects::cps(&p, vec![]),
                    effects::cps(&q, vec![]),
                    effects::call(&failing("boom"), vec![]),
                ]))
                .await;
            seen.borrow_mut().push(outcome.is_err().to_string());
            cx.take("NEVER").await?;
            Ok(Value::Unit)
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(entries(&hits), vec!["cancel:p", "cancel:q"]);
    assert_eq!(entries(&resumed), vec!["true"]);

    task.cancel();
    assert_eq!(entries(&hits), vec!["cancel:p", "cancel:q"]);
    assert_eq!(entries(&resumed), vec!["true"]);
}

#[test]
fn settled_race_ignores_later_cancellation() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let hits = log();

    let (p, q) = (pending_cps("p", &hits), pending_cps("q", &hits));
    let one = Routine::sync("one", |_| Ok(Value::data(1)));
    let root = Routine::saga("root", move |cx, _| {
        let (p, q, one) = (p.clone(), q.clone(), one.clone());
        async move {
            let winner = cx
                .race(Keyed::record([
                    ("p", effects::cps(&p, vec![])),
                    ("q", effects::cps(&q, vec![])),
                    ("one", effects::call(&one, vec![])),
                ]))
                .await?;
            assert_eq!(winner.get("one").and_then(Value::as_i64), Some(1));
            cx.take("NEVER").await?;
            Ok(Value::Unit)
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert!(task.is_running());
    assert_eq!(entries(&hits), vec!["cancel:p", "cancel:q"]);

    task.cancel();
    assert!(task.is_cancelled());
    assert_eq!(entries(&hits), vec!["cancel:p", "cancel:q"]);
}

#[test]
fn race_keeps_only_the_winner() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let root = Routine::saga("root", |cx, _| async move {
        cx.race(Keyed::record([
            ("a", effects::take("A")),
            ("b", effects::take("B")),
        ]))
        .await
    });

    let task = rt.run(&root, vec![]).unwrap();
    env.emit(Message::new("B")).unwrap();
    let result = task.result().unwrap_or_default();
    assert_eq!(
        result.get("b").and_then(Value::as_message).map(Message::kind),
        Some("B")
    );
    assert!(result.get("a").is_none());

    // 負けた take は abandon されているので、後続の A は誰にも届かない
    env.emit(Message::new("A")).unwrap();
    assert!(task.result().unwrap_or_default().get("a").is_none());
}

#[test]
fn select_reads_environment_state() {
    let env = Rc::new(MemoryEnv::with_state(serde_json::json!({"user": {"name": "ada"}})));
    let rt = runtime(&env);

    let root = Routine::saga("root", |cx, _| async move {
        cx.select(|state| Ok(Value::data(state["user"]["name"].clone())))
            .await
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(
        task.result().and_then(|v| v.as_str().map(str::to_owned)),
        Some("ada".into())
    );
}

#[test]
fn cps_callback_resumes_the_workflow() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let double = CpsRoutine::new("double", |args, done| {
        let n = args.first().and_then(Value::as_i64).unwrap_or(0);
        done(Ok(Value::data(n * 2)));
        Ok(None)
    });

    let root = Routine::saga("root", move |cx, _| {
        let double = double.clone();
        async move { cx.cps(&double, vec![Value::data(21)]).await }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(task.result().and_then(|v| v.as_i64()), Some(42));
}

#[test]
fn context_is_inherited_by_forks() {
    let env = Rc::new(MemoryEnv::new());
    let rt = RuntimeBuilder::new(env.clone())
        .context("api", Value::data("v1"))
        .build()
        .unwrap();
    let seen = log();

    let child = {
        let seen = Rc::clone(&seen);
        Routine::saga("child", move |cx, _| {
            let seen = Rc::clone(&seen);
            async move {
                for key in ["api", "user"] {
                    let value = cx.get_context(key).await?;
                    seen.borrow_mut().push(value.as_str().unwrap_or("-").to_string());
                }
                Ok(Value::Unit)
            }
        })
    };
    let root = Routine::saga("root", move |cx, _| {
        let child = child.clone();
        async move {
            cx.set_context([("user", Value::data("ada"))]).await?;
            cx.fork(&child, vec![]).await?;
            Ok(Value::Unit)
        }
    });

    let task = rt.run(&root, vec![]).unwrap();
    assert_eq!(entries(&seen), vec!["v1", "ada"]);
    // root の set_context は runtime の context を変えない
    assert!(rt.context().get("user").is_none());
    assert!(task.context().get("user").is_some());
}

#[test]
fn monitor_records_the_effect_tree() {
    let env = Rc::new(MemoryEnv::new());
    let monitor = Rc::new(RecordingMonitor::new());
    let rt = RuntimeBuilder::new(env.clone())
        .monitor(monitor.clone())
        .build()
        .unwrap();

    let one = Routine::sync("one", |_| Ok(Value::data(1)));
    let root = Routine::saga("root", move |cx, _| {
        let one = one.clone();
        async move {
            cx.all(Keyed::list([effects::call(&one, vec![]), effects::take("GO")]))
                .await
        }
    });

    rt.run(&root, vec![]).unwrap();
    env.emit(Message::new("GO")).unwrap();

    let records = monitor.records();
    let root_record = &records[0];
    assert_eq!(root_record.kind, "root");
    assert!(root_record.parent_id.is_none());
    assert_eq!(root_record.status, EffectStatus::Resolved);

    let all = monitor.children(root_record.effect_id);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, "all");

    let members = monitor.children(all[0].effect_id);
    let labels: Vec<_> = members.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["0", "1"]);
    assert!(members.iter().all(|r| r.status == EffectStatus::Resolved));
    assert_eq!(
        monitor.messages().iter().map(Message::kind).collect::<Vec<_>>(),
        vec!["GO"]
    );
}

#[test]
fn root_routine_must_produce_a_workflow() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);
    let plain = Routine::sync("plain", |_| Ok(Value::Unit));
    assert!(matches!(
        rt.run(&plain, vec![]),
        Err(SagaError::Validation(_))
    ));
}

#[test]
fn hand_written_workflow_runs_as_root() {
    let env = Rc::new(MemoryEnv::new());
    let rt = runtime(&env);

    let mut steps = 0;
    let task = rt.run_workflow("", move |input: Resume| {
        steps += 1;
        match (steps, input) {
            (1, _) => Step::Yield(effects::put(Message::new("HELLO"))),
            (_, Resume::Next(_)) => Step::Return(Value::data(steps)),
            _ => Step::Return(Value::Unit),
        }
    });

    assert_eq!(env.dispatched_kinds(), vec!["HELLO"]);
    assert_eq!(task.name(), "root");
    assert_eq!(task.result().and_then(|v| v.as_i64()), Some(2));
}

#[tokio::test]
async fn done_settles_once_with_cancelled() {
    LocalSet::new()
        .run_until(async {
            let env = Rc::new(MemoryEnv::new());
            let rt = runtime(&env);
            let root = Routine::saga("root", |cx, _| async move {
                cx.delay(Duration::from_secs(3600)).await?;
                Ok(Value::Unit)
            });

            let task = rt.run(&root, vec![]).unwrap();
            let waiter = task.clone();
            let pending = tokio::task::spawn_local(async move { waiter.done().await });
            task.cancel();

            let outcome = pending.await.unwrap();
            assert!(matches!(outcome, Ok(Value::Cancelled)));
            assert!(matches!(task.done().await, Ok(Value::Cancelled)));
        })
        .await;
}

#[tokio::test]
async fn async_routines_are_awaited() {
    LocalSet::new()
        .run_until(async {
            let env = Rc::new(MemoryEnv::new());
            let rt = runtime(&env);
            let fetch = Routine::future("fetch", |args| async move {
                tokio::task::yield_now().await;
                Ok(Value::data(args.len() as i64))
            });
            let root = Routine::saga("root", move |cx, _| {
                let fetch = fetch.clone();
                async move { cx.call(&fetch, vec![Value::Unit, Value::Unit]).await }
            });

            let task = rt.run(&root, vec![]).unwrap();
            assert_eq!(task.done().await.ok().and_then(|v| v.as_i64()), Some(2));
        })
        .await;
}

#[tokio::test]
async fn put_resolve_waits_for_the_acknowledgement() {
    LocalSet::new()
        .run_until(async {
            let env = Rc::new(MemoryEnv::new());
            env.on_dispatch(|message| {
                let kind = message.kind().to_string();
                (kind == "SAVE").then(|| -> LocalFuture<Outcome> {
                    Box::pin(async move {
                        tokio::task::yield_now().await;
                        Ok(Value::data("saved"))
                    })
                })
            });
            let rt = runtime(&env);

            let root = Routine::saga("root", |cx, _| async move {
                let plain = cx.put(Message::new("SAVE")).await?;
                let acked = cx.put_resolve(Message::new("SAVE")).await?;
                Ok(Value::List(vec![plain, acked]))
            });

            let task = rt.run(&root, vec![]).unwrap();
            let result = task.done().await.unwrap();
            let values = result.as_list().unwrap_or_default();
            assert!(values[0].is_unit());
            assert_eq!(values[1].as_str(), Some("saved"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn throttle_forks_at_most_once_per_window() {
    LocalSet::new()
        .run_until(async {
            let env = Rc::new(MemoryEnv::new());
            let rt = runtime(&env);
            let seen = log();

            let worker = {
                let seen = Rc::clone(&seen);
                Routine::sync("click", move |args| {
                    let id = args
                        .last()
                        .and_then(Value::as_message)
                        .and_then(|m| m.payload().as_i64())
                        .unwrap_or(0);
                    seen.borrow_mut().push(id.to_string());
                    Ok(Value::Unit)
                })
            };
            let root = Routine::saga("root", move |cx, _| {
                let worker = worker.clone();
                async move {
                    cx.run(effects::throttle(
                        Duration::from_millis(100),
                        "CLICK",
                        &worker,
                        vec![],
                    ))
                    .await?;
                    Ok(Value::Unit)
                }
            });

            let task = rt.run(&root, vec![]).unwrap();
            for id in 1..=3 {
                env.emit(Message::with_payload("CLICK", id.into())).unwrap();
            }
            assert_eq!(entries(&seen), vec!["1"]);

            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(entries(&seen), vec!["1", "3"]);

            task.cancel();
            assert!(!task.is_running());
        })
        .await;
}
