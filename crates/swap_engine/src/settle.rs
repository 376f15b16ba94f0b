//! Deferred work collected while swapping and replayed in the settle phase.

use core::fmt;
use dom::{Document, NodeId};

/// Caller-supplied settle work.
pub type SettleCallback = Box<dyn FnOnce(&mut Document)>;

/// One deferred action. Tasks run once, in the order they were queued.
pub enum SettleTask {
    RemoveClass { node: NodeId, class: String },
    /// Put back the response's values for settled attributes; `None` removes.
    RestoreAttributes {
        node: NodeId,
        values: Vec<(String, Option<String>)>,
    },
    Callback(SettleCallback),
}

impl fmt::Debug for SettleTask {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveClass { node, class } => write!(formatter, "RemoveClass({node}, {class:?})"),
            Self::RestoreAttributes { node, values } => {
                write!(formatter, "RestoreAttributes({node}, {values:?})")
            }
            Self::Callback(_) => formatter.write_str("Callback"),
        }
    }
}

impl SettleTask {
    pub fn run(self, document: &mut Document) {
        match self {
            Self::RemoveClass { node, class } => document.remove_class(node, &class),
            Self::RestoreAttributes { node, values } => {
                for (name, value) in values {
                    match value {
                        Some(value) => document.set_attribute(node, &name, &value),
                        None => {
                            let _previous = document.remove_attribute(node, &name);
                        }
                    }
                }
            }
            Self::Callback(callback) => callback(document),
        }
    }
}

/// State shared by one swap and its settle phase.
#[derive(Debug, Default)]
pub struct SettleInfo {
    pub tasks: Vec<SettleTask>,
    /// Elements that carry the settling class and anchor scroll/show.
    pub elts: Vec<NodeId>,
    /// Title extracted from the response.
    pub title: Option<String>,
}

impl SettleInfo {
    pub fn new(target: NodeId) -> Self {
        Self {
            tasks: Vec::new(),
            elts: vec![target],
            title: None,
        }
    }

    /// Nodes the settle phase will touch.
    pub fn held_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        let task_nodes = self.tasks.iter().filter_map(|task| match task {
            SettleTask::RemoveClass { node, .. } | SettleTask::RestoreAttributes { node, .. } => Some(*node),
            SettleTask::Callback(_) => None,
        });
        self.elts.iter().copied().chain(task_nodes)
    }

    pub fn push(&mut self, task: SettleTask) {
        self.tasks.push(task);
    }

    /// Run and discard every queued task.
    pub fn run_tasks(&mut self, document: &mut Document) {
        for task in self.tasks.drain(..) {
            task.run(document);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn tasks_run_once_in_order() {
        let mut doc = Document::parse(r#"<div id="d" class="old tmp" style="x"></div>"#).unwrap();
        let div = doc.element_by_id("d").unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);

        let mut settle = SettleInfo::new(div);
        settle.push(SettleTask::RemoveClass {
            node: div,
            class: "tmp".into(),
        });
        assert_eq!(settle.held_nodes().collect::<Vec<_>>(), [div, div]);
        settle.push(SettleTask::RestoreAttributes {
            node: div,
            values: vec![("class".into(), Some("new".into())), ("style".into(), None)],
        });
        settle.push(SettleTask::Callback(Box::new(move |doc: &mut Document| {
            seen.set(seen.get() + 1);
            doc.add_class(div, "done");
        })));
        settle.run_tasks(&mut doc);
        settle.run_tasks(&mut doc);

        assert_eq!(calls.get(), 1);
        assert_eq!(doc.attribute(div, "class"), Some("new done"));
        assert!(!doc.has_class(div, "tmp"));
        assert!(!doc.has_attribute(div, "style"));
        assert!(settle.tasks.is_empty());
    }
}
