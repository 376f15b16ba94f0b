//! The swap/settle pipeline.
//!
//! A response moves through `SwapScheduled -> Swapped -> SettleScheduled ->
//! Settled`. Zero delays run their phase synchronously; anything else waits on
//! the engine's virtual-time [`TimerQueue`], which hosts advance directly or
//! through [`SwapEngine::run_until_idle`].

use crate::config::SwapConfig;
use crate::events::{EventBus, SwapEvent};
use crate::oob::{apply_oob, extract_oob, select_oob};
use crate::outcome::{OutcomeSource, ResolvedOutcome, classify};
use crate::resolve::{TriggerAttributes, apply_response_headers, resolve_swap};
use crate::scheduler::{TimerKey, TimerQueue};
use crate::selector::query_ext;
use crate::settle::{SettleCallback, SettleInfo, SettleTask};
use crate::strategy::{StrategyRegistry, SwapContent, SwapContext};
use crate::swap_spec::{ScrollSpec, SwapSpecification};
use anyhow::{Result, anyhow};
use dom::{Document, NodeId, ScrollEdge, SelectionRange};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::iter;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tracing::info_span;

/// Status of an exchange that never produced a response.
pub const TRANSPORT_FAILURE: u16 = 0;
/// Responses with this status carry no content and are never swapped.
pub const NO_CONTENT: u16 = 204;

/// A completed network exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchange {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl Exchange {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Stand-in for a request that failed before any response arrived.
    pub fn transport_failure() -> Self {
        Self::new(TRANSPORT_FAILURE, "")
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Idle,
    SwapScheduled,
    Swapped,
    SettleScheduled,
    Settled,
}

/// What became of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDisposition {
    pub ticket: u64,
    pub outcome: ResolvedOutcome,
    /// Whether the response is applied to the document, now or once its swap
    /// delay runs out.
    pub swapped: bool,
    pub target: Option<NodeId>,
    /// State of the trigger's cycle when handling returned.
    pub state: PipelineState,
}

/// Extra inputs of a swap.
#[derive(Default)]
pub struct SwapOptions {
    /// `hx-select-oob` value applied to the content.
    pub select_oob: Option<String>,
    /// Element owning the cycle; a newer swap for the same element supersedes
    /// this one. Defaults to the target.
    pub context: Option<NodeId>,
    pub after_swap: Option<SettleCallback>,
    pub after_settle: Option<SettleCallback>,
}

struct PendingSwap {
    ticket: u64,
    elt: NodeId,
    target: NodeId,
    spec: SwapSpecification,
    body: String,
    options: SwapOptions,
}

struct PendingSettle {
    ticket: u64,
    elt: NodeId,
    target: NodeId,
    spec: SwapSpecification,
    settle: SettleInfo,
}

enum Job {
    Swap(Box<PendingSwap>),
    Settle(Box<PendingSettle>),
}

impl Job {
    fn held_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::Swap(pending) => {
                let mut nodes = vec![pending.elt, pending.target];
                nodes.extend(pending.options.context);
                nodes
            }
            Self::Settle(pending) => {
                let mut nodes = vec![pending.elt, pending.target];
                nodes.extend(pending.settle.held_nodes());
                nodes
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cycle {
    ticket: u64,
    state: PipelineState,
    timer: Option<TimerKey>,
}

struct FocusSnapshot {
    node: NodeId,
    id: String,
    selection: Option<SelectionRange>,
}

/// Owns a document and applies responses to it.
pub struct SwapEngine {
    document: Document,
    config: SwapConfig,
    strategies: StrategyRegistry,
    timers: TimerQueue<Job>,
    cycles: HashMap<NodeId, Cycle>,
    events: EventBus,
    next_ticket: u64,
}

impl SwapEngine {
    pub fn new(document: Document, config: SwapConfig) -> Self {
        Self {
            document,
            config,
            strategies: StrategyRegistry::new(),
            timers: TimerQueue::new(),
            cycles: HashMap::new(),
            events: EventBus::new(),
            next_ticket: 0,
        }
    }

    /// Engine configured from the document's `htmx-config` meta tag.
    ///
    /// # Errors
    /// Returns error if the meta tag holds invalid configuration.
    pub fn from_document(document: Document) -> Result<Self> {
        let config = SwapConfig::from_meta(&document)?;
        Ok(Self::new(document, config))
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[inline]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    #[inline]
    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// Settings may change between requests; cycles already scheduled keep the
    /// specification they were resolved with.
    #[inline]
    pub fn config_mut(&mut self) -> &mut SwapConfig {
        &mut self.config
    }

    #[inline]
    pub fn strategies_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.strategies
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.events.subscribe()
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    /// No swap or settle is waiting on a timer.
    pub fn is_idle(&self) -> bool {
        self.timers.is_empty()
    }

    /// State of the latest cycle owned by `elt`.
    pub fn state(&self, elt: NodeId) -> PipelineState {
        self.cycles
            .get(&elt)
            .map_or(PipelineState::Idle, |cycle| cycle.state)
    }

    /// Handle a response for `trigger`, reading its attributes by plain
    /// ancestor inheritance.
    pub fn handle_response(&mut self, trigger: NodeId, exchange: &Exchange) -> ResponseDisposition {
        let attrs = TriggerAttributes::collect(&self.document, trigger);
        self.handle_response_with(trigger, &attrs, exchange)
    }

    /// Handle a response for `trigger` with an attribute set resolved by the
    /// caller.
    pub fn handle_response_with(
        &mut self,
        trigger: NodeId,
        attrs: &TriggerAttributes,
        exchange: &Exchange,
    ) -> ResponseDisposition {
        let _span = info_span!("handle_response", status = exchange.status).entered();

        let ticket = self.issue_ticket();
        let outcome = classify(exchange.status, &self.config);
        if outcome.is_error {
            self.events.emit(SwapEvent::ResponseError {
                elt: trigger,
                status: exchange.status,
            });
        }
        if let Some(name) = &outcome.event_name {
            self.events.emit(SwapEvent::Custom {
                elt: trigger,
                name: name.clone(),
            });
        }

        let mut disposition = ResponseDisposition {
            ticket,
            outcome,
            swapped: false,
            target: None,
            state: PipelineState::Idle,
        };
        if !self.wants_swap(exchange.status, &disposition.outcome, attrs) {
            debug!("status {} is not swapped", exchange.status);
            self.events.emit(SwapEvent::Completed {
                ticket,
                swapped: false,
            });
            return disposition;
        }

        let mut resolution = resolve_swap(
            &self.document,
            trigger,
            attrs,
            &disposition.outcome,
            &self.config,
            &self.strategies,
        );
        apply_response_headers(
            &mut resolution,
            &self.document,
            trigger,
            exchange.header("HX-Retarget"),
            exchange.header("HX-Reswap"),
            &self.config,
            &self.strategies,
        );
        resolution.spec.ignore_title |= disposition.outcome.ignore_title;

        let Some(target) = resolution.target else {
            info!(
                "no swap target for {:?}; response dropped",
                resolution.target_selector
            );
            self.events.emit(SwapEvent::TargetError {
                elt: trigger,
                selector: resolution.target_selector,
            });
            self.events.emit(SwapEvent::Completed {
                ticket,
                swapped: false,
            });
            return disposition;
        };

        let options = SwapOptions {
            select_oob: attrs.select_oob.as_ref().map(|attr| attr.value.clone()),
            context: Some(trigger),
            ..SwapOptions::default()
        };
        disposition.swapped = true;
        disposition.target = Some(target);
        disposition.state = self.begin(ticket, target, exchange.body.clone(), resolution.spec, options);
        self.reclaim();
        disposition
    }

    /// Swap `content` into `target` directly, without response classification.
    /// Returns the ticket reported in [`SwapEvent::Completed`].
    pub fn swap(
        &mut self,
        target: NodeId,
        content: &str,
        mut spec: SwapSpecification,
        options: SwapOptions,
    ) -> u64 {
        if !self.strategies.contains(&spec.style) {
            warn!(
                "unknown swap style {:?}, using {:?}",
                spec.style, self.config.default_swap_style
            );
            self.config.default_swap_style.clone_into(&mut spec.style);
        }
        let ticket = self.issue_ticket();
        self.begin(ticket, target, content.to_owned(), spec, options);
        self.reclaim();
        ticket
    }

    /// Run every swap and settle due at or before `now_ms`.
    pub fn advance(&mut self, now_ms: u64) {
        while let Some(job) = self.timers.pop_next_before(now_ms) {
            match job {
                Job::Swap(pending) => self.run_swap(*pending),
                Job::Settle(pending) => self.run_settle(*pending),
            }
        }
        self.timers.advance_to(now_ms);
        self.reclaim();
    }

    pub fn advance_by(&mut self, delta_ms: u64) {
        self.advance(self.timers.now_ms().saturating_add(delta_ms));
    }

    /// Sleep through pending delays on the tokio clock until nothing is left.
    pub async fn run_until_idle(&mut self) {
        while let Some(deadline) = self.timers.next_deadline() {
            let wait = deadline.saturating_sub(self.timers.now_ms());
            if wait > 0 {
                time::sleep(Duration::from_millis(wait)).await;
            }
            self.advance(deadline);
        }
    }

    /// Free replaced content and parse containers that no pending cycle
    /// still refers to, and forget cycles of elements that are gone.
    fn reclaim(&mut self) {
        let held: Vec<NodeId> = self.timers.pending().flat_map(Job::held_nodes).collect();
        self.document.reclaim_detached(&held);
        let document = &self.document;
        self.cycles.retain(|elt, _| document.is_live(*elt));
    }

    fn issue_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    fn wants_swap(&self, status: u16, outcome: &ResolvedOutcome, attrs: &TriggerAttributes) -> bool {
        if status == TRANSPORT_FAILURE || status == NO_CONTENT {
            return false;
        }
        // Error settings only open up failures the policy left at its default.
        outcome.should_swap
            || (outcome.is_error
                && outcome.source == OutcomeSource::Default
                && attrs.error_path_engaged(&self.config))
    }

    fn set_cycle(&mut self, elt: NodeId, ticket: u64, state: PipelineState, timer: Option<TimerKey>) {
        if let Some(cycle) = self
            .cycles
            .get_mut(&elt)
            .filter(|cycle| cycle.ticket == ticket)
        {
            cycle.state = state;
            cycle.timer = timer;
        }
    }

    /// Drop a pending swap of `elt` or flush its pending settle.
    fn supersede(&mut self, elt: NodeId) {
        let Some(timer) = self.cycles.get(&elt).and_then(|cycle| cycle.timer) else {
            return;
        };
        match self.timers.cancel(timer) {
            Some(Job::Swap(pending)) => {
                info!("swap {} superseded by a newer request", pending.ticket);
                self.document
                    .remove_class(pending.target, &self.config.swapping_class);
                self.events.emit(SwapEvent::Superseded {
                    elt,
                    ticket: pending.ticket,
                });
                self.events.emit(SwapEvent::Completed {
                    ticket: pending.ticket,
                    swapped: false,
                });
            }
            Some(Job::Settle(pending)) => {
                debug!("flushing settle {} before a newer request", pending.ticket);
                self.run_settle(*pending);
            }
            None => {}
        }
    }

    fn begin(
        &mut self,
        ticket: u64,
        target: NodeId,
        body: String,
        spec: SwapSpecification,
        options: SwapOptions,
    ) -> PipelineState {
        let elt = options.context.unwrap_or(target);
        self.supersede(elt);
        self.cycles.insert(
            elt,
            Cycle {
                ticket,
                state: PipelineState::SwapScheduled,
                timer: None,
            },
        );
        self.document.add_class(target, &self.config.swapping_class);

        let delay = spec.swap_delay_ms;
        let pending = PendingSwap {
            ticket,
            elt,
            target,
            spec,
            body,
            options,
        };
        if delay == 0 {
            self.run_swap(pending);
        } else {
            trace!("swap {ticket} scheduled in {delay}ms");
            let key = self.timers.schedule_after(delay, Job::Swap(Box::new(pending)));
            self.set_cycle(elt, ticket, PipelineState::SwapScheduled, Some(key));
        }
        self.state(elt)
    }

    fn run_swap(&mut self, pending: PendingSwap) {
        let PendingSwap {
            ticket,
            elt,
            target,
            spec,
            body,
            options,
        } = pending;
        let _span = info_span!("swap", ticket, style = %spec.style).entered();

        self.set_cycle(elt, ticket, PipelineState::Swapped, None);
        self.document.remove_class(target, &self.config.swapping_class);
        if !self.document.is_connected(target) {
            info!("swap target {target} left the document before swap {ticket}");
            self.finish(elt, ticket, PipelineState::Idle, false);
            return;
        }

        let mut settle = SettleInfo::new(target);
        let inserted = match self.mutate(target, &spec, body, options.select_oob.as_deref(), &mut settle) {
            Ok(inserted) => inserted,
            Err(err) => {
                warn!("swap {ticket} into {target} failed: {err:#}");
                self.finish(elt, ticket, PipelineState::Idle, false);
                return;
            }
        };
        if let Some(after_swap) = options.after_swap {
            after_swap(&mut self.document);
        }
        self.events.emit(SwapEvent::AfterSwap { elt, target, inserted });
        if let Some(after_settle) = options.after_settle {
            settle.push(SettleTask::Callback(after_settle));
        }
        for node in &settle.elts {
            self.document.add_class(*node, &self.config.settling_class);
        }

        let delay = spec.settle_delay_ms;
        let pending = PendingSettle {
            ticket,
            elt,
            target,
            spec,
            settle,
        };
        if delay == 0 {
            self.run_settle(pending);
        } else {
            trace!("settle {ticket} scheduled in {delay}ms");
            let key = self
                .timers
                .schedule_after(delay, Job::Settle(Box::new(pending)));
            self.set_cycle(elt, ticket, PipelineState::SettleScheduled, Some(key));
        }
    }

    /// Apply the content: out-of-band parts first, then the main swap.
    /// Returns the top-level nodes inserted.
    fn mutate(
        &mut self,
        target: NodeId,
        spec: &SwapSpecification,
        body: String,
        select_oob_value: Option<&str>,
        settle: &mut SettleInfo,
    ) -> Result<Vec<NodeId>> {
        let strategy = self
            .strategies
            .get(&spec.style)
            .ok_or_else(|| anyhow!("no strategy registered for {:?}", spec.style))?;
        let focus = self.capture_focus();

        let mut oob = Vec::new();
        let content = if strategy.parses_markup() {
            let parsed = self.document.parse_fragment(&body)?;
            settle.title = parsed.title;
            self.strip_scripts(parsed.root);
            if let Some(value) = select_oob_value {
                oob.extend(select_oob(&mut self.document, parsed.root, value, &self.config));
            }
            oob.extend(extract_oob(&mut self.document, parsed.root, &self.config));
            SwapContent::Fragment(parsed.root)
        } else {
            SwapContent::Text(body)
        };

        let inserted = {
            let mut ctx = SwapContext::new(&mut self.document, settle, &self.config.attributes_to_settle);
            for fragment in oob {
                apply_oob(&mut ctx, &self.strategies, &self.events, fragment);
            }
            strategy.apply(&mut ctx, target, content)?;
            ctx.inserted().to_vec()
        };

        for node in &inserted {
            if self.document.is_element(*node) {
                self.document.add_class(*node, &self.config.added_class);
                settle.push(SettleTask::RemoveClass {
                    node: *node,
                    class: self.config.added_class.clone(),
                });
            }
        }
        if self.config.allow_script_tags {
            self.report_scripts(&inserted);
        }
        if let Some(snapshot) = focus {
            self.restore_focus(&snapshot, spec);
        }
        Ok(inserted)
    }

    fn strip_scripts(&mut self, fragment: NodeId) {
        if self.config.allow_script_tags {
            return;
        }
        let scripts: Vec<NodeId> = self
            .document
            .descendants(fragment)
            .into_iter()
            .filter(|node| self.document.tag_name(*node) == Some("script"))
            .collect();
        for script in scripts {
            debug!("removing script {script} from swapped content");
            self.document.detach(script);
        }
    }

    fn report_scripts(&self, inserted: &[NodeId]) {
        for node in inserted {
            let subtree = iter::once(*node).chain(self.document.descendants(*node));
            for script in subtree.filter(|candidate| self.document.tag_name(*candidate) == Some("script")) {
                if self.document.is_connected(script) {
                    self.events.emit(SwapEvent::ScriptInserted { script });
                }
            }
        }
    }

    fn capture_focus(&self) -> Option<FocusSnapshot> {
        let node = self.document.active_element()?;
        let id = self.document.id_of(node)?.to_owned();
        Some(FocusSnapshot {
            node,
            id,
            selection: self.document.selection(),
        })
    }

    /// Move focus to the element that took over the id of a replaced one.
    fn restore_focus(&mut self, snapshot: &FocusSnapshot, spec: &SwapSpecification) {
        if self.document.is_connected(snapshot.node) {
            return;
        }
        let Some(node) = self.document.element_by_id(&snapshot.id) else {
            return;
        };
        let prevent_scroll = !spec.focus_scroll.unwrap_or(self.config.default_focus_scroll);
        if self.document.focus(node, prevent_scroll) {
            trace!("focus restored to #{}", snapshot.id);
            if let Some(range) = snapshot.selection {
                self.document.set_selection_range(range.start, range.end);
            }
        }
    }

    fn run_settle(&mut self, pending: PendingSettle) {
        let PendingSettle {
            ticket,
            elt,
            target,
            spec,
            mut settle,
        } = pending;
        let _span = info_span!("settle", ticket).entered();

        settle.run_tasks(&mut self.document);
        for node in &settle.elts {
            self.document.remove_class(*node, &self.config.settling_class);
        }
        if let Some(title) = settle.title.as_deref() {
            if spec.ignore_title || self.config.ignore_title {
                trace!("response title {title:?} ignored");
            } else {
                self.document.set_title(title);
            }
        }
        if let Some(scroll) = &spec.scroll {
            self.apply_scroll(scroll, &settle.elts);
        }
        if let Some(show) = &spec.show {
            self.apply_show(show, &settle.elts);
        }
        self.events.emit(SwapEvent::AfterSettle { elt, target });
        self.finish(elt, ticket, PipelineState::Settled, true);
    }

    /// Element a scroll or show applies to: its selector's match, otherwise the
    /// first (top) or last (bottom) settled element.
    fn scroll_anchor(&self, scroll: &ScrollSpec, elts: &[NodeId]) -> Option<NodeId> {
        let first = elts.first().copied();
        let selected = scroll
            .target
            .as_deref()
            .zip(first)
            .and_then(|(selector, anchor)| query_ext(&self.document, anchor, selector));
        selected.or(match scroll.edge {
            ScrollEdge::Top => first,
            ScrollEdge::Bottom => elts.last().copied(),
        })
    }

    fn apply_scroll(&mut self, scroll: &ScrollSpec, elts: &[NodeId]) {
        if let Some(node) = self.scroll_anchor(scroll, elts) {
            self.document.scroll_to(node, scroll.edge);
        }
    }

    fn apply_show(&mut self, show: &ScrollSpec, elts: &[NodeId]) {
        let behavior = self.config.scroll_behavior;
        if show.target.as_deref() == Some("window") {
            self.document.scroll_window(show.edge, behavior);
        } else if let Some(node) = self.scroll_anchor(show, elts) {
            self.document.scroll_into_view(node, show.edge, behavior);
        }
    }

    fn finish(&mut self, elt: NodeId, ticket: u64, state: PipelineState, swapped: bool) {
        self.set_cycle(elt, ticket, state, None);
        self.events.emit(SwapEvent::Completed { ticket, swapped });
    }
}
