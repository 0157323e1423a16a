//! Context selectors driven through the reference host tree.

use std::cell::RefCell;
use std::rc::Rc;

use hookportal_core::{RenderScope, ShallowEq};
use hookportal_harness::{FnComponent, NodeId, TestTree};
use hookportal_runtime::{ContextSelector, ProviderHandle, Selection, create_context_selector};

#[derive(Debug, Clone, PartialEq)]
struct Doc {
    x: i32,
    title: String,
}

fn doc(x: i32, title: &str) -> Doc {
    Doc {
        x,
        title: title.to_owned(),
    }
}

type Reads<R> = Rc<RefCell<Vec<Option<R>>>>;
type SelectionSlot<R> = Rc<RefCell<Option<Selection<Doc, R>>>>;

struct Consumer<R: ShallowEq + Clone + 'static> {
    node: NodeId,
    reads: Reads<R>,
    selection: SelectionSlot<R>,
}

impl<R: ShallowEq + Clone + 'static> Consumer<R> {
    fn last(&self) -> Option<R> {
        self.reads.borrow().last().cloned().flatten()
    }
}

/// Mount a component that selects from `selector` on its first render and
/// reads the selection on every render.
fn mount_consumer<R>(
    tree: &mut TestTree,
    parent: NodeId,
    selector: &Rc<ContextSelector<Doc>>,
    pick: fn(&Doc) -> R,
) -> Consumer<R>
where
    R: ShallowEq + Clone + 'static,
{
    let reads: Reads<R> = Rc::new(RefCell::new(Vec::new()));
    let selection: SelectionSlot<R> = Rc::new(RefCell::new(None));

    let selector = Rc::clone(selector);
    let sink = Rc::clone(&reads);
    let slot = Rc::clone(&selection);
    let node = tree
        .mount_child(
            parent,
            FnComponent::new(move |scope: &dyn RenderScope| {
                let mut slot = slot.borrow_mut();
                let selection =
                    slot.get_or_insert_with(|| selector.select(pick, scope.invalidator()));
                sink.borrow_mut().push(selection.read());
            }),
        )
        .unwrap();

    Consumer {
        node,
        reads,
        selection,
    }
}

struct Mounted {
    tree: TestTree,
    selector: Rc<ContextSelector<Doc>>,
    provider: NodeId,
    doc: ProviderHandle<Doc>,
}

/// Provider with the handler as its first child. Nothing is flushed yet, so
/// consumers mounted next render in the same pass the handler binds in.
fn mount() -> Mounted {
    let selector = Rc::new(create_context_selector::<Doc>());
    let (provider_node, handle) = selector.provider(doc(1, "a"));
    let mut tree = TestTree::new();
    let provider = tree.mount_root(provider_node);
    tree.mount_child(provider, selector.handler()).unwrap();
    Mounted {
        tree,
        selector,
        provider,
        doc: handle,
    }
}

fn pick_title(d: &Doc) -> String {
    d.title.clone()
}

#[test]
fn first_read_is_synchronous() {
    let mut m = mount();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    m.tree.flush().unwrap();

    assert_eq!(*title.reads.borrow(), vec![Some("a".to_owned())]);
    assert!(title.selection.borrow().as_ref().unwrap().is_subscribed());
    assert_eq!(m.selector.portal().store().channel_count(), 1);
}

#[test]
fn tree_mounted_in_one_pass_notifies_on_change() {
    let mut m = mount();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    m.tree.flush().unwrap();
    assert_eq!(m.tree.render_count(title.node), Some(1));

    m.doc.set(doc(2, "b"));
    m.tree.flush().unwrap();

    assert_eq!(m.tree.render_count(title.node), Some(2));
    assert_eq!(title.last(), Some("b".to_owned()));
}

#[test]
fn consumer_mounted_before_the_handler_subscribes_once_it_binds() {
    let selector = Rc::new(create_context_selector::<Doc>());
    let (provider_node, handle) = selector.provider(doc(1, "a"));
    let mut tree = TestTree::new();
    let provider = tree.mount_root(provider_node);
    let title = mount_consumer(&mut tree, provider, &selector, pick_title);
    tree.flush().unwrap();
    assert!(!title.selection.borrow().as_ref().unwrap().is_subscribed());
    assert_eq!(title.last(), Some("a".to_owned()));

    tree.mount_child(provider, selector.handler()).unwrap();
    tree.flush().unwrap();
    assert!(title.selection.borrow().as_ref().unwrap().is_subscribed());

    handle.set(doc(1, "b"));
    tree.flush().unwrap();
    assert_eq!(tree.render_count(title.node), Some(2));
    assert_eq!(title.last(), Some("b".to_owned()));
}

#[test]
fn consumer_mounted_after_the_handler_binds() {
    let mut m = mount();
    m.tree.flush().unwrap();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    m.tree.flush().unwrap();
    assert!(title.selection.borrow().as_ref().unwrap().is_subscribed());

    m.doc.set(doc(1, "b"));
    m.tree.flush().unwrap();
    assert_eq!(m.tree.render_count(title.node), Some(2));
    assert_eq!(title.last(), Some("b".to_owned()));
}

#[test]
fn consumers_rerender_only_when_their_view_changes() {
    let mut m = mount();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    let x = mount_consumer(&mut m.tree, m.provider, &m.selector, |d: &Doc| d.x);
    m.tree.flush().unwrap();
    assert_eq!(m.tree.render_count(title.node), Some(1));
    assert_eq!(m.tree.render_count(x.node), Some(1));

    m.doc.set(doc(2, "a"));
    m.tree.flush().unwrap();
    assert_eq!(m.tree.render_count(title.node), Some(1));
    assert_eq!(m.tree.render_count(x.node), Some(2));
    assert_eq!(x.last(), Some(2));

    m.doc.update(|d| Doc {
        title: "b".into(),
        ..d.clone()
    });
    m.tree.flush().unwrap();
    assert_eq!(m.tree.render_count(title.node), Some(2));
    assert_eq!(m.tree.render_count(x.node), Some(2));
    assert_eq!(title.last(), Some("b".to_owned()));
}

#[test]
fn provider_unmount_leaves_the_cached_view() {
    let mut m = mount();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    m.tree.flush().unwrap();
    m.doc.set(doc(1, "b"));
    m.tree.flush().unwrap();

    m.tree.unmount(m.provider).unwrap();

    let slot = title.selection.borrow();
    let selection = slot.as_ref().unwrap();
    assert!(!selection.is_subscribed());
    assert!(!m.selector.source().is_attached());
    assert_eq!(selection.read(), Some("b".to_owned()));
}

#[test]
fn unrelated_render_rechecks_the_source() {
    let mut m = mount();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    m.tree.flush().unwrap();

    // The consumer renders for its own reasons in the same pass the provider
    // changes; it must see the new title before the subscription catches up.
    m.doc.set(doc(1, "c"));
    m.tree.invalidator(title.node).unwrap().invalidate();
    m.tree.flush().unwrap();

    assert_eq!(m.tree.render_count(title.node), Some(2));
    assert_eq!(title.last(), Some("c".to_owned()));
}

#[test]
fn dropping_a_selection_releases_its_channel() {
    let mut m = mount();
    let title = mount_consumer(&mut m.tree, m.provider, &m.selector, pick_title);
    m.tree.flush().unwrap();
    assert_eq!(m.selector.portal().store().channel_count(), 1);

    title.selection.borrow_mut().take();
    assert_eq!(m.selector.portal().store().channel_count(), 0);
    m.tree.flush().unwrap();
}
