// SPDX-License-Identifier: GPL-3.0-only

//! Shared liveness state behind the public handles
//!
//! A `Session` owns the backend for as long as the library handle is open.
//! Every volume group opened through it is registered here so that closing
//! the library can close them first. Each volume group carries a `VgState`
//! that its logical and physical volume handles hold on to; flipping
//! `VgState::open` invalidates all of them at once.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use lvm_types::OpenMode;

use crate::backend::Backend;
use crate::error::{LvmError, NativeResult, Operation, Result, classify};

pub(crate) struct VgState {
    pub(crate) name: String,
    pub(crate) mode: OpenMode,
    open: Cell<bool>,
    removed_lvs: RefCell<HashSet<String>>,
}

impl VgState {
    pub(crate) fn new(name: &str, mode: OpenMode) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            mode,
            open: Cell::new(true),
            removed_lvs: RefCell::new(HashSet::new()),
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }

    pub(crate) fn mark_removed(&self, lv_uuid: &str) {
        self.removed_lvs.borrow_mut().insert(lv_uuid.to_string());
    }

    pub(crate) fn is_removed(&self, lv_uuid: &str) -> bool {
        self.removed_lvs.borrow().contains(lv_uuid)
    }
}

struct OpenVg<B: Backend> {
    handle: B::Vg,
    state: Rc<VgState>,
}

pub(crate) struct Session<B: Backend> {
    backend: RefCell<Option<B>>,
    open_vgs: RefCell<Vec<OpenVg<B>>>,
}

impl<B: Backend> Session<B> {
    pub(crate) fn new(backend: B) -> Rc<Self> {
        Rc::new(Self {
            backend: RefCell::new(Some(backend)),
            open_vgs: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.backend.borrow().is_some()
    }

    /// Run a fallible backend call, classifying its failure.
    pub(crate) fn call<T>(
        &self,
        operation: Operation,
        target: &str,
        f: impl FnOnce(&B) -> NativeResult<T>,
    ) -> Result<T> {
        let guard = self.backend.borrow();
        let Some(backend) = guard.as_ref() else {
            return Err(LvmError::closed(operation, target, "library handle"));
        };
        f(backend).map_err(|native| {
            let err = classify(operation, target, native);
            tracing::warn!(kind = ?err.kind(), "{err}");
            err
        })
    }

    /// Run an infallible backend accessor.
    pub(crate) fn query<T>(
        &self,
        operation: Operation,
        target: &str,
        f: impl FnOnce(&B) -> T,
    ) -> Result<T> {
        let guard = self.backend.borrow();
        match guard.as_ref() {
            Some(backend) => Ok(f(backend)),
            None => Err(LvmError::closed(operation, target, "library handle")),
        }
    }

    pub(crate) fn register(&self, handle: B::Vg, state: Rc<VgState>) {
        self.open_vgs.borrow_mut().push(OpenVg { handle, state });
    }

    /// Close one volume group natively and invalidate its children.
    pub(crate) fn release_vg(&self, state: &Rc<VgState>, handle: B::Vg) -> Result<()> {
        if !state.is_open() {
            return Ok(());
        }
        state.open.set(false);
        self.open_vgs
            .borrow_mut()
            .retain(|open| !Rc::ptr_eq(&open.state, state));

        if !self.is_open() {
            return Ok(());
        }
        tracing::debug!(vg = %state.name, "closing volume group");
        self.call(Operation::VgClose, &state.name, |backend| backend.vg_close(handle))
    }

    /// Close every registered volume group, then drop the backend.
    ///
    /// All resources are released even if some closes fail; the first
    /// failure is reported.
    pub(crate) fn shutdown(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        let open_vgs: Vec<OpenVg<B>> = self.open_vgs.borrow_mut().drain(..).collect();
        let mut first_error = None;
        for open in open_vgs {
            if !open.state.is_open() {
                continue;
            }
            tracing::debug!(
                vg = %open.state.name,
                "closing volume group left open at library close"
            );
            open.state.open.set(false);
            let handle = open.handle;
            if let Err(err) = self.call(Operation::VgClose, &open.state.name, |backend| {
                backend.vg_close(handle)
            }) {
                first_error.get_or_insert(err);
            }
        }

        drop(self.backend.borrow_mut().take());
        tracing::info!("LVM library handle closed");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
