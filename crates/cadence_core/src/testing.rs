//! Behaviors shared by the unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_xfer::{Snapshot, Xfer, XferResult};

use crate::behavior::{Capability, DisabledMask, ModuleSource, UpdateBehavior, UpdateSleep};
use crate::clock::Frame;
use crate::context::FrameContext;

/// Shared record of `(probe name, frame)` for every update that ran.
#[derive(Clone, Default)]
pub(crate) struct Log(Rc<RefCell<Vec<(String, Frame)>>>);

impl Log {
    pub(crate) fn push(&self, name: &str, frame: Frame) {
        self.0.borrow_mut().push((name.to_owned(), frame));
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.0.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    pub(crate) fn frames_of(&self, name: &str) -> Vec<Frame> {
        self.0
            .borrow()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|&(_, frame)| frame)
            .collect()
    }
}

/// Sleeps forever and never does anything.
pub(crate) struct Dormant;

impl Snapshot for Dormant {
    fn xfer(&mut self, _xfer: &mut dyn Xfer) -> XferResult<()> {
        Ok(())
    }
}

impl UpdateBehavior for Dormant {
    fn type_tag(&self) -> &'static str {
        "Dormant"
    }

    fn update(&mut self, _ctx: &mut FrameContext<'_>) -> UpdateSleep {
        UpdateSleep::Forever
    }
}

/// Logs each run and sleeps a fixed amount.
pub(crate) struct Probe {
    name: String,
    sleep: u32,
    forever: bool,
    processes: u32,
    runs: u32,
    log: Log,
}

impl Probe {
    pub(crate) fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_owned(),
            sleep: 0,
            forever: false,
            processes: 0,
            runs: 0,
            log: log.clone(),
        }
    }

    pub(crate) fn sleeping(mut self, frames: u32) -> Self {
        self.sleep = frames;
        self
    }

    pub(crate) fn forever(mut self) -> Self {
        self.forever = true;
        self
    }

    pub(crate) fn processing(mut self, mask: DisabledMask) -> Self {
        self.processes = mask.bits();
        self
    }
}

impl Snapshot for Probe {
    fn xfer(&mut self, xfer: &mut dyn Xfer) -> XferResult<()> {
        xfer.xfer_string(&mut self.name)?;
        xfer.xfer_u32(&mut self.sleep)?;
        xfer.xfer_bool(&mut self.forever)?;
        xfer.xfer_u32(&mut self.processes)?;
        xfer.xfer_u32(&mut self.runs)
    }
}

impl UpdateBehavior for Probe {
    fn type_tag(&self) -> &'static str {
        "Probe"
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> UpdateSleep {
        self.runs += 1;
        self.log.push(&self.name, ctx.frame());
        if self.forever {
            UpdateSleep::Forever
        } else {
            UpdateSleep::Frames(self.sleep)
        }
    }

    fn disabled_types_to_process(&self) -> DisabledMask {
        DisabledMask::from_bits(self.processes)
    }
}

/// Module source that knows `Probe` and `Dormant`, or nothing.
pub(crate) struct TestModules {
    log: Option<Log>,
}

impl TestModules {
    pub(crate) fn new(log: &Log) -> Self {
        Self {
            log: Some(log.clone()),
        }
    }

    pub(crate) fn empty() -> Self {
        Self { log: None }
    }
}

impl ModuleSource for TestModules {
    fn behavior(&self, tag: &str) -> Option<Box<dyn UpdateBehavior>> {
        let log = self.log.as_ref()?;
        match tag {
            "Probe" => Some(Box::new(Probe::new("", log))),
            "Dormant" => Some(Box::new(Dormant)),
            _ => None,
        }
    }

    fn capability(&self, _tag: &str) -> Option<Box<dyn Capability>> {
        None
    }
}
