//! Property-based invariant tests for the channel registry.
//!
//! Drives a [`Store`] through random sequences of add / remove / unmount /
//! rebind operations and checks after every step:
//!
//! 1. `ids` and `by_id` stay in 1:1 correspondence
//! 2. `ids` preserves registration order of the surviving channels
//! 3. Channel ids are never reused
//! 4. `add_channel` succeeds iff a handler is bound
//! 5. Unbinding leaves the registry empty and delivers exactly one
//!    pre-removal call to every channel that was still registered

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use hookportal_core::{
    ChannelHelpers, ChannelId, HandlerId, PortalError, RenderScope, Snapshot, Store,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add,
    Remove(usize),
    Unmount(usize),
    Rebind,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Add),
        2 => any::<usize>().prop_map(Op::Remove),
        2 => any::<usize>().prop_map(Op::Unmount),
        1 => Just(Op::Rebind),
    ]
}

struct Model {
    live: Vec<(ChannelId, ChannelHelpers)>,
    seen: HashSet<ChannelId>,
    handler: Option<HandlerId>,
}

fn check_registry(store: &Store, model: &Model) -> Result<(), TestCaseError> {
    let registry = store.get_channels();
    prop_assert_eq!(registry.ids().len(), registry.by_id().len());
    for id in registry.ids() {
        prop_assert!(registry.by_id().contains_key(id));
    }
    let expected: Vec<ChannelId> = model.live.iter().map(|(id, _)| id.clone()).collect();
    prop_assert_eq!(registry.ids(), expected.as_slice());
    Ok(())
}

proptest! {
    #[test]
    fn registry_stays_consistent(ops in proptest::collection::vec(arb_op(), 0..=60)) {
        let store = Store::new();
        let deliveries: Rc<RefCell<Vec<(ChannelId, bool)>>> = Rc::new(RefCell::new(Vec::new()));
        let handler = HandlerId::generate("h_");
        store.bind_handler(handler.clone()).unwrap();
        let mut model = Model { live: Vec::new(), seen: HashSet::new(), handler: Some(handler) };

        for op in ops {
            match op {
                Op::Add => {
                    let slot: Rc<RefCell<Option<ChannelId>>> = Rc::new(RefCell::new(None));
                    let slot_in = Rc::clone(&slot);
                    let log = Rc::clone(&deliveries);
                    let result = store.add_channel(
                        Rc::new(|_: &dyn RenderScope| Ok(Rc::new(0_u8) as Snapshot)),
                        Rc::new(move |_, before| {
                            if let Some(id) = slot_in.borrow().clone() {
                                log.borrow_mut().push((id, before));
                            }
                        }),
                        None,
                    );
                    match (&model.handler, result) {
                        (Some(_), Ok((id, helpers))) => {
                            prop_assert!(model.seen.insert(id.clone()), "channel id reused");
                            *slot.borrow_mut() = Some(id.clone());
                            model.live.push((id, helpers));
                        }
                        (None, Err(err)) => prop_assert_eq!(err, PortalError::NotBound),
                        (bound, other) => {
                            prop_assert!(false, "bound={:?} add_channel={:?}", bound.is_some(), other.map(|(id, _)| id));
                        }
                    }
                }
                Op::Remove(pick) => {
                    if !model.live.is_empty() {
                        let (id, _) = model.live.remove(pick % model.live.len());
                        prop_assert!(store.remove_channel(&id).is_some());
                        prop_assert!(store.remove_channel(&id).is_none());
                    }
                }
                Op::Unmount(pick) => {
                    if !model.live.is_empty() {
                        let (_, helpers) = model.live.remove(pick % model.live.len());
                        helpers.unmount_channel();
                    }
                }
                Op::Rebind => {
                    if let Some(current) = model.handler.take() {
                        deliveries.borrow_mut().clear();
                        let orphaned: Vec<ChannelId> =
                            model.live.drain(..).map(|(id, _)| id).collect();
                        store.unbind_handler(&current).unwrap();
                        let expected: Vec<(ChannelId, bool)> =
                            orphaned.into_iter().map(|id| (id, true)).collect();
                        prop_assert_eq!(&*deliveries.borrow(), &expected);
                        prop_assert!(store.get_channels().is_empty());
                    } else {
                        let next = HandlerId::generate("h_");
                        store.bind_handler(next.clone()).unwrap();
                        model.handler = Some(next);
                    }
                }
            }
            check_registry(&store, &model)?;
        }
    }
}
