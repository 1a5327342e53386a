//! # Frame Ordering Scenario
//!
//! A, B and C registered on frame 0 with wake frames 5, 5, 3 and priorities
//! 2, 1, 0. C runs on frame 3; on frame 5 B runs before A. B destroys A,
//! and A stays visible for the rest of frame 5, then is gone.

use std::cell::RefCell;
use std::rc::Rc;

use cadence::core::{
    FrameContext, ObjectBlueprint, ObjectId, Schedule, UpdateBehavior, UpdateSleep,
};
use cadence::xfer::{Snapshot, Xfer, XferResult};
use cadence::{Kernel, KernelConfig, ModuleFactory};

type Log = Rc<RefCell<Vec<String>>>;

/// Logs its run and optionally destroys a target, then sleeps forever.
struct Actor {
    name: &'static str,
    victim: Option<ObjectId>,
    log: Log,
}

impl Snapshot for Actor {
    fn xfer(&mut self, _xfer: &mut dyn Xfer) -> XferResult<()> {
        Ok(())
    }
}

impl UpdateBehavior for Actor {
    fn type_tag(&self) -> &'static str {
        "Actor"
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> UpdateSleep {
        self.log.borrow_mut().push(format!("{}@{}", self.name, ctx.frame()));
        if let Some(victim) = self.victim {
            assert!(ctx.destroy(victim).unwrap());
            // A second destroy in the same frame changes nothing.
            assert!(!ctx.destroy(victim).unwrap());
        }
        UpdateSleep::Forever
    }
}

/// Reports every frame whether `target` is in the global collection.
struct Watcher {
    target: ObjectId,
    log: Log,
}

impl Snapshot for Watcher {
    fn xfer(&mut self, _xfer: &mut dyn Xfer) -> XferResult<()> {
        Ok(())
    }
}

impl UpdateBehavior for Watcher {
    fn type_tag(&self) -> &'static str {
        "Watcher"
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> UpdateSleep {
        let listed = ctx.objects().any(|object| object.id() == self.target);
        let state = match ctx.object(self.target) {
            Some(object) if object.is_destroyed() => "destroyed",
            Some(_) => "alive",
            None => "gone",
        };
        self.log
            .borrow_mut()
            .push(format!("watch@{}:{}:{}", ctx.frame(), listed, state));
        UpdateSleep::None
    }
}

fn kernel() -> Kernel {
    let config = KernelConfig {
        crc_interval: 0,
        validate_scheduler: true,
        ..KernelConfig::default()
    };
    Kernel::new(config, ModuleFactory::new()).unwrap()
}

fn actor(name: &'static str, victim: Option<ObjectId>, log: &Log) -> Box<Actor> {
    Box::new(Actor {
        name,
        victim,
        log: Rc::clone(log),
    })
}

#[test]
fn test_abc_order_and_deferred_destruction() {
    let log: Log = Rc::default();
    let mut kernel = kernel();
    assert_eq!(kernel.now(), 0);

    let a = kernel
        .spawn(ObjectBlueprint::new("A").with_behavior(actor("A", None, &log), Schedule::at(5, 2)))
        .unwrap();
    let b = kernel
        .spawn(ObjectBlueprint::new("B").with_behavior(actor("B", Some(a), &log), Schedule::at(5, 1)))
        .unwrap();
    let c = kernel
        .spawn(ObjectBlueprint::new("C").with_behavior(actor("C", None, &log), Schedule::at(3, 0)))
        .unwrap();
    kernel
        .spawn(ObjectBlueprint::new("watcher").with_behavior(
            Box::new(Watcher { target: a, log: Rc::clone(&log) }),
            Schedule::at(5, 3),
        ))
        .unwrap();

    let reports = kernel.run(4).unwrap();
    assert!(reports.iter().all(|r| r.swept.is_empty()));
    assert_eq!(*log.borrow(), vec!["C@3"]);

    let frame5 = kernel.step().unwrap();
    assert_eq!(frame5.frame, 5);
    assert_eq!(frame5.swept, vec![a]);
    assert_eq!(
        *log.borrow(),
        vec!["C@3", "B@5", "watch@5:true:destroyed"]
    );

    kernel.step().unwrap();
    assert_eq!(log.borrow().last().map(String::as_str), Some("watch@6:false:gone"));
    assert!(kernel.world().find(a).is_none());
    assert!(kernel.world().find(b).is_some());
    assert!(kernel.world().find(c).is_some());
}

#[test]
fn test_same_frame_ties_use_priority_not_registration_order() {
    let log: Log = Rc::default();
    let mut kernel = kernel();
    for (name, priority) in [("p3", 3), ("p1", 1), ("p2", 2), ("p0", 0)] {
        kernel
            .spawn(ObjectBlueprint::new(name).with_behavior(actor(name, None, &log), Schedule::at(2, priority)))
            .unwrap();
    }

    kernel.run(2).unwrap();
    assert_eq!(*log.borrow(), vec!["p0@2", "p1@2", "p2@2", "p3@2"]);
}

#[test]
fn test_wake_frame_in_the_past_is_rejected() {
    let log: Log = Rc::default();
    let mut kernel = kernel();
    kernel.run(3).unwrap();

    let result = kernel.spawn(ObjectBlueprint::new("late").with_behavior(actor("late", None, &log), Schedule::at(1, 0)));
    assert!(matches!(
        result,
        Err(cadence::SessionError::Kernel(cadence::core::KernelError::WakeInPast { requested: 1, now: 3 }))
    ));
    assert_eq!(kernel.world().registry().len(), 0);
}
