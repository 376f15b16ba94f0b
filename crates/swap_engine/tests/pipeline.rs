//! Swap/settle pipeline behaviour: out-of-band content, response rules and
//! headers, settle side effects and the async driver.

use anyhow::Result;
use dom::{Document, NodeId, ScrollBehavior, ScrollEdge, ScrollRecord, SelectionRange};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use swap_engine::{
    CodePattern, Exchange, InsertionStrategy, PipelineState, ResponseRule, SwapConfig, SwapContent,
    SwapContext, SwapEngine, SwapEvent, SwapOptions, SwapSpecification, parse_swap_spec,
};
use tokio::sync::broadcast::Receiver;
use tokio::time::Instant;

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn engine(html: &str) -> SwapEngine {
        engine_with(html, SwapConfig::default())
    }

    fn engine_with(html: &str, config: SwapConfig) -> SwapEngine {
        SwapEngine::new(Document::parse(html).unwrap(), config)
    }

    fn by_id(engine: &SwapEngine, id: &str) -> NodeId {
        engine.document().element_by_id(id).unwrap()
    }

    fn drain(events: &mut Receiver<SwapEvent>) -> Vec<SwapEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    /// # Panics
    /// Panics if marked elements are not moved to their targets
    #[test]
    fn oob_elements_go_to_their_targets() {
        init();
        let mut engine = engine(r#"<div id="main">old</div><div id="side">old side</div><ul id="log"><li>a</li></ul>"#);
        let main = by_id(&engine, "main");
        let side = by_id(&engine, "side");
        let mut events = engine.subscribe();
        engine.handle_response(
            main,
            &Exchange::new(
                200,
                r##"new<div id="side" hx-swap-oob="true">new side</div><li hx-swap-oob="beforeend:#log">b</li>"##,
            ),
        );
        let doc = engine.document();
        assert_eq!(doc.inner_html(main), "new");
        assert!(!doc.is_connected(side));
        assert_eq!(doc.text_content(by_id(&engine, "side")), "new side");
        assert_eq!(doc.inner_html(by_id(&engine, "log")), "<li>a</li>b");
        let body = doc.body().unwrap();
        assert_eq!(
            doc.to_json_value(body),
            json!({
                "type": "element", "tag": "body", "attrs": {},
                "children": [
                    { "type": "element", "tag": "div", "attrs": { "id": "main" },
                      "children": [ { "type": "text", "text": "new" } ] },
                    { "type": "element", "tag": "div", "attrs": { "id": "side" },
                      "children": [ { "type": "text", "text": "new side" } ] },
                    { "type": "element", "tag": "ul", "attrs": { "id": "log" },
                      "children": [
                          { "type": "element", "tag": "li", "attrs": {},
                            "children": [ { "type": "text", "text": "a" } ] },
                          { "type": "text", "text": "b" }
                      ] }
                ]
            })
        );

        let seen = drain(&mut events);
        let oob_swaps = seen
            .iter()
            .filter(|event| matches!(event, SwapEvent::OobAfterSwap { .. }))
            .count();
        assert_eq!(oob_swaps, 2);
        let first_oob = seen
            .iter()
            .position(|event| matches!(event, SwapEvent::OobAfterSwap { .. }));
        let main_swap = seen
            .iter()
            .position(|event| matches!(event, SwapEvent::AfterSwap { .. }));
        assert!(first_oob < main_swap);
    }

    /// # Panics
    /// Panics if the after-swap notification misses the inserted nodes
    #[test]
    fn after_swap_lists_inserted_nodes() {
        init();
        let mut engine = engine(r#"<div id="d">old</div>"#);
        let div = by_id(&engine, "d");
        let mut events = engine.subscribe();
        engine.handle_response(div, &Exchange::new(200, r#"<p id="a">1</p><p id="b">2</p>"#));
        let inserted = vec![by_id(&engine, "a"), by_id(&engine, "b")];
        assert!(drain(&mut events).contains(&SwapEvent::AfterSwap {
            elt: div,
            target: div,
            inserted
        }));
    }

    /// # Panics
    /// Panics if replaced content is kept alive after its cycle settles
    #[test]
    fn replaced_content_is_reclaimed() {
        init();
        let mut engine = engine(r#"<div id="d"><p>x</p></div>"#);
        let div = by_id(&engine, "d");
        let before = engine.document().live_nodes();
        let first = engine.document().children(div)[0];
        for round in 0..1000 {
            engine.handle_response(div, &Exchange::new(200, format!("<p>{round}</p>")));
            assert_eq!(engine.document().live_nodes(), before, "round {round}");
        }
        assert!(!engine.document().is_live(first));
        assert_eq!(engine.document().inner_html(div), "<p>999</p>");

        let mut delayed = engine_with(r#"<div id="d" hx-swap="settle:10"><p>x</p></div>"#, SwapConfig::default());
        let div = by_id(&delayed, "d");
        delayed.handle_response(div, &Exchange::new(200, r#"<p id="n">y</p>"#));
        let added = by_id(&delayed, "n");
        assert!(delayed.document().has_class(added, "htmx-added"));
        delayed.advance(10);
        assert!(!delayed.document().has_class(added, "htmx-added"));
    }

    /// # Panics
    /// Panics if a swap still runs after its target left the document
    #[test]
    fn detached_target_cancels_delayed_swap() {
        init();
        let mut engine = engine(
            r##"<button id="b" hx-target="#d" hx-swap="innerHTML swap:10">go</button><div id="d">old</div>"##,
        );
        let button = by_id(&engine, "b");
        let div = by_id(&engine, "d");
        let mut events = engine.subscribe();
        let disposition = engine.handle_response(button, &Exchange::new(200, "<p>new</p>"));
        assert_eq!(engine.state(button), PipelineState::SwapScheduled);
        assert_eq!(engine.document().inner_html(div), "old");

        engine.document_mut().detach(div);
        engine.advance(10);
        let body = engine.document().body().unwrap();
        assert_eq!(engine.document().text_content(body), "go");
        assert_eq!(engine.state(button), PipelineState::Idle);
        let seen = drain(&mut events);
        assert!(seen.contains(&SwapEvent::Completed {
            ticket: disposition.ticket,
            swapped: false
        }));
        assert!(!seen.iter().any(|event| matches!(event, SwapEvent::AfterSwap { .. })));
    }

    /// # Panics
    /// Panics if a marker without a target is not reported
    #[test]
    fn oob_without_target_is_reported() {
        init();
        let mut engine = engine(r#"<div id="main"></div>"#);
        let main = by_id(&engine, "main");
        let mut events = engine.subscribe();
        engine.handle_response(main, &Exchange::new(200, r#"x<p id="nowhere" hx-swap-oob="true">y</p>"#));
        assert_eq!(engine.document().inner_html(main), "x");
        assert!(drain(&mut events).contains(&SwapEvent::OobErrorNoTarget {
            selector: Some("#nowhere".into())
        }));
    }

    /// # Panics
    /// Panics if `hx-select-oob` does not pick content out of the response
    #[test]
    fn select_oob_from_trigger_attribute() {
        init();
        let mut engine = engine(r##"<button id="b" hx-target="#main" hx-select-oob="#alert:afterbegin"></button><div id="main"></div><div id="alert">old</div>"##);
        let button = by_id(&engine, "b");
        engine.handle_response(button, &Exchange::new(200, r#"<div id="alert">!</div><p>body</p>"#));
        assert_eq!(engine.document().inner_html(by_id(&engine, "main")), "<p>body</p>");
        assert_eq!(engine.document().inner_html(by_id(&engine, "alert")), "!old");
    }

    /// # Panics
    /// Panics if response headers do not win over attributes
    #[test]
    fn retarget_and_reswap_headers() {
        init();
        let mut engine = engine(r#"<button id="b">b</button><ul id="list"><li>1</li></ul>"#);
        let button = by_id(&engine, "b");
        let exchange = Exchange::new(200, "<li>2</li>")
            .with_header("HX-Retarget", "#list")
            .with_header("hx-reswap", "beforeend");
        let disposition = engine.handle_response(button, &exchange);
        let list = by_id(&engine, "list");
        assert_eq!(disposition.target, Some(list));
        assert_eq!(engine.document().inner_html(list), "<li>1</li><li>2</li>");
        assert_eq!(engine.document().inner_html(button), "b");
    }

    /// # Panics
    /// Panics if a matching response rule is not applied
    #[test]
    fn response_rules_drive_the_outcome() {
        init();
        let mut validation = ResponseRule::new(CodePattern::Exact(422), true, true);
        validation.event = Some("validation-failed".into());
        validation.target = Some("#errors".into());
        let config = SwapConfig {
            response_handling: vec![
                validation,
                ResponseRule::new(CodePattern::parse("5xx").unwrap(), false, true),
            ],
            http_error_codes_to_swap: vec![503],
            ..SwapConfig::default()
        };
        let mut engine = engine_with(r#"<form id="f">form</form><div id="errors"></div>"#, config);
        let form = by_id(&engine, "f");
        let mut events = engine.subscribe();

        let disposition = engine.handle_response(form, &Exchange::new(422, "bad input"));
        assert!(disposition.swapped);
        assert_eq!(engine.document().inner_html(by_id(&engine, "errors")), "bad input");
        assert_eq!(engine.document().inner_html(form), "form");
        assert!(drain(&mut events).contains(&SwapEvent::Custom {
            elt: form,
            name: "validation-failed".into()
        }));

        // The rule table wins over the allow-list.
        let disposition = engine.handle_response(form, &Exchange::new(503, "down"));
        assert!(!disposition.swapped);
        assert_eq!(engine.document().inner_html(form), "form");
    }

    /// # Panics
    /// Panics if the allow-list does not let an error swap
    #[test]
    fn allow_listed_errors_swap() {
        init();
        let config = SwapConfig {
            http_error_codes_to_swap: vec![422],
            ..SwapConfig::default()
        };
        let mut engine = engine_with(r#"<div id="d">old</div>"#, config);
        let div = by_id(&engine, "d");
        assert!(!engine.handle_response(div, &Exchange::new(400, "no")).swapped);
        assert!(engine.handle_response(div, &Exchange::new(422, "yes")).swapped);
        assert_eq!(engine.document().inner_html(div), "yes");
    }

    /// # Panics
    /// Panics if no-content responses swap
    #[test]
    fn no_content_is_never_swapped() {
        init();
        let config = SwapConfig {
            response_handling: vec![ResponseRule::new(CodePattern::Any, true, false)],
            ..SwapConfig::default()
        };
        let mut engine = engine_with(r#"<div id="d">old</div>"#, config);
        let div = by_id(&engine, "d");
        let disposition = engine.handle_response(div, &Exchange::new(204, ""));
        assert!(disposition.outcome.should_swap);
        assert!(!disposition.swapped);
        assert_eq!(engine.document().inner_html(div), "old");
    }

    /// # Panics
    /// Panics if the response title is not applied at settle time
    #[test]
    fn title_is_applied_when_settling() {
        init();
        let mut engine = engine(r#"<div id="d" hx-swap="settle:20"></div>"#);
        let div = by_id(&engine, "d");
        engine.handle_response(div, &Exchange::new(200, "<title>Fresh</title><p>x</p>"));
        assert_eq!(engine.document().title(), "");
        assert_eq!(engine.document().inner_html(div), r#"<p class="htmx-added">x</p>"#);
        engine.advance(20);
        assert_eq!(engine.document().title(), "Fresh");
        assert_eq!(engine.document().inner_html(div), "<p>x</p>");

        let config = SwapConfig {
            ignore_title: true,
            ..SwapConfig::default()
        };
        let mut ignoring = engine_with(r#"<div id="d"></div>"#, config);
        let div = by_id(&ignoring, "d");
        ignoring.handle_response(div, &Exchange::new(200, "<title>Fresh</title>x"));
        assert_eq!(ignoring.document().title(), "");
    }

    /// # Panics
    /// Panics if indicator classes are not added and cleared in order
    #[test]
    fn indicator_classes_follow_the_phases() {
        init();
        let mut engine = engine(r#"<div id="d" hx-swap="swap:10 settle:10"></div>"#);
        let div = by_id(&engine, "d");
        let disposition = engine.handle_response(div, &Exchange::new(200, r#"<p id="p">x</p>"#));
        assert_eq!(disposition.state, PipelineState::SwapScheduled);
        assert!(engine.document().has_class(div, "htmx-swapping"));

        engine.advance(10);
        assert_eq!(engine.state(div), PipelineState::SettleScheduled);
        let paragraph = by_id(&engine, "p");
        assert!(!engine.document().has_class(div, "htmx-swapping"));
        assert!(engine.document().has_class(div, "htmx-settling"));
        assert!(engine.document().has_class(paragraph, "htmx-added"));

        engine.advance(20);
        assert_eq!(engine.state(div), PipelineState::Settled);
        assert!(!engine.document().has_class(div, "htmx-settling"));
        assert!(!engine.document().has_class(paragraph, "htmx-added"));
        assert!(engine.is_idle());
    }

    /// # Panics
    /// Panics if focus and selection do not survive a replacement
    #[test]
    fn focus_moves_to_the_replacement() {
        init();
        let mut engine = engine(r#"<div id="d"><input id="i1" value="abc"></div>"#);
        let div = by_id(&engine, "d");
        let old_input = by_id(&engine, "i1");
        assert!(engine.document_mut().focus(old_input, true));
        engine.document_mut().set_selection_range(1, 3);

        engine.handle_response(div, &Exchange::new(200, r#"<input id="i1" value="abcd">"#));
        let new_input = by_id(&engine, "i1");
        assert_ne!(new_input, old_input);
        assert_eq!(engine.document().active_element(), Some(new_input));
        assert_eq!(
            engine.document().selection(),
            Some(SelectionRange { start: 1, end: 3 })
        );
        assert!(engine.document().scroll_records().is_empty());
    }

    /// # Panics
    /// Panics if `focus-scroll` does not scroll the restored element into view
    #[test]
    fn focus_scroll_modifier() {
        init();
        let mut engine = engine(r#"<div id="d" hx-swap="innerHTML focus-scroll:true"><input id="i1"></div>"#);
        let div = by_id(&engine, "d");
        let old_input = by_id(&engine, "i1");
        engine.document_mut().focus(old_input, true);
        engine.handle_response(div, &Exchange::new(200, r#"<input id="i1">"#));
        let new_input = by_id(&engine, "i1");
        assert_eq!(
            engine.document().scroll_records(),
            [ScrollRecord::IntoView {
                node: new_input,
                edge: ScrollEdge::Top,
                behavior: ScrollBehavior::Auto
            }]
        );
    }

    /// # Panics
    /// Panics if scroll and show requests are not issued after settling
    #[test]
    fn scroll_and_show() {
        init();
        let config = SwapConfig {
            scroll_behavior: ScrollBehavior::Smooth,
            ..SwapConfig::default()
        };
        let mut engine = engine_with(
            r#"<div id="log" hx-swap="beforeend scroll:bottom show:window:top"></div><div id="other" hx-swap="show:#log:bottom"></div>"#,
            config,
        );
        let log = by_id(&engine, "log");
        engine.handle_response(log, &Exchange::new(200, "<p>line</p>"));
        assert_eq!(
            engine.document_mut().take_scroll_records(),
            [
                ScrollRecord::Element {
                    node: log,
                    edge: ScrollEdge::Bottom
                },
                ScrollRecord::Window {
                    edge: ScrollEdge::Top,
                    behavior: ScrollBehavior::Smooth
                },
            ]
        );

        let other = by_id(&engine, "other");
        engine.handle_response(other, &Exchange::new(200, "x"));
        assert_eq!(
            engine.document().scroll_records(),
            [ScrollRecord::IntoView {
                node: log,
                edge: ScrollEdge::Bottom,
                behavior: ScrollBehavior::Smooth
            }]
        );
    }

    /// # Panics
    /// Panics if scripts are not reported or not stripped
    #[test]
    fn script_handling() {
        init();
        let mut engine = engine(r#"<div id="d"></div>"#);
        let div = by_id(&engine, "d");
        let mut events = engine.subscribe();
        engine.handle_response(div, &Exchange::new(200, "<p><script>go()</script></p>"));
        let scripts = drain(&mut events)
            .into_iter()
            .filter(|event| matches!(event, SwapEvent::ScriptInserted { .. }))
            .count();
        assert_eq!(scripts, 1);

        let config = SwapConfig {
            allow_script_tags: false,
            ..SwapConfig::default()
        };
        let mut stripped = engine_with(r#"<div id="d"></div>"#, config);
        let div = by_id(&stripped, "d");
        stripped.handle_response(div, &Exchange::new(200, "<p><script>go()</script></p>"));
        assert_eq!(stripped.document().inner_html(div), "<p></p>");
    }

    struct Reverse;

    impl InsertionStrategy for Reverse {
        fn parses_markup(&self) -> bool {
            false
        }

        fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
            let text = match content {
                SwapContent::Text(text) => text,
                SwapContent::Fragment(fragment) => ctx.document.text_content(fragment),
            };
            ctx.document
                .set_text_content(target, &text.chars().rev().collect::<String>())
        }
    }

    /// # Panics
    /// Panics if a registered strategy is not used by name
    #[test]
    fn custom_strategy() {
        init();
        let mut engine = engine(r#"<div id="d" hx-swap="reverse">x</div>"#);
        engine.strategies_mut().register("reverse", Reverse);
        let div = by_id(&engine, "d");
        engine.handle_response(div, &Exchange::new(200, "<b>abc</b>"));
        assert_eq!(engine.document().text_content(div), ">b/<cba>b<");
    }

    /// # Panics
    /// Panics if the direct swap entry point skips callbacks or select-oob
    #[test]
    fn direct_swap_with_options() {
        init();
        let mut engine = engine(r#"<div id="d"></div><div id="note"></div>"#);
        let div = by_id(&engine, "d");
        let calls = Rc::new(RefCell::new(Vec::new()));
        let after_swap = Rc::clone(&calls);
        let after_settle = Rc::clone(&calls);
        let options = SwapOptions {
            select_oob: Some("#note:innerHTML".into()),
            after_swap: Some(Box::new(move |_doc: &mut Document| after_swap.borrow_mut().push("swap"))),
            after_settle: Some(Box::new(move |_doc: &mut Document| after_settle.borrow_mut().push("settle"))),
            ..SwapOptions::default()
        };
        let spec = parse_swap_spec("bogus settle:5", "innerHTML", engine.config());
        engine.swap(div, r#"<p>main</p><span id="note">n</span>"#, spec, options);
        assert_eq!(*calls.borrow(), ["swap"]);
        assert_eq!(engine.document().inner_html(div), r#"<p class="htmx-added">main</p>"#);
        assert_eq!(engine.document().inner_html(by_id(&engine, "note")), "n");

        engine.advance_by(5);
        assert_eq!(*calls.borrow(), ["swap", "settle"]);
        assert_eq!(engine.document().inner_html(div), "<p>main</p>");
    }

    /// # Panics
    /// Panics if cycles of different elements interfere
    #[test]
    fn different_elements_are_independent() {
        init();
        let mut engine = engine(r#"<div id="a" hx-swap="swap:10"></div><div id="b" hx-swap="swap:10"></div>"#);
        let first = by_id(&engine, "a");
        let second = by_id(&engine, "b");
        engine.handle_response(first, &Exchange::new(200, "1"));
        engine.handle_response(second, &Exchange::new(200, "2"));
        engine.advance(10);
        assert_eq!(engine.document().inner_html(first), "1");
        assert_eq!(engine.document().inner_html(second), "2");
    }

    /// # Panics
    /// Panics if the meta tag configuration is not picked up
    #[test]
    fn configuration_from_meta_tag() {
        init();
        let doc = Document::parse(
            r#"<html><head><meta name="htmx-config" content='{"defaultSwapStyle":"beforeend","settlingClass":"calm"}'></head><body><div id="d">a</div></body></html>"#,
        )
        .unwrap();
        let mut engine = SwapEngine::from_document(doc).unwrap();
        let div = by_id(&engine, "d");
        engine.handle_response(div, &Exchange::new(200, "b"));
        assert_eq!(engine.document().inner_html(div), "ab");
        assert_eq!(engine.config().settling_class, "calm");
    }

    /// # Panics
    /// Panics if the async driver does not run every delayed phase
    #[tokio::test(start_paused = true)]
    async fn run_until_idle_sleeps_through_delays() {
        init();
        let mut engine = engine(r#"<div id="d" hx-swap="swap:100ms settle:50ms"></div>"#);
        let div = by_id(&engine, "d");
        let mut events = engine.subscribe();
        let started = Instant::now();
        let disposition = engine.handle_response(div, &Exchange::new(200, "<title>T</title>done"));

        engine.run_until_idle().await;
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(engine.now_ms(), 150);
        assert_eq!(engine.document().inner_html(div), "done");
        assert_eq!(engine.document().title(), "T");
        assert!(drain(&mut events).contains(&SwapEvent::Completed {
            ticket: disposition.ticket,
            swapped: true
        }));
    }

    /// # Panics
    /// Panics if a hand-built swap specification is not honoured
    #[tokio::test(start_paused = true)]
    async fn direct_swap_with_delays() {
        init();
        let mut engine = engine(r#"<div id="d">old</div>"#);
        let div = by_id(&engine, "d");
        let mut spec = SwapSpecification::with_style("outerHTML", engine.config());
        spec.swap_delay_ms = 30;
        engine.swap(div, r#"<section id="s">new</section>"#, spec, SwapOptions::default());
        assert_eq!(engine.state(div), PipelineState::SwapScheduled);
        engine.run_until_idle().await;
        assert!(!engine.document().is_connected(div));
        assert_eq!(engine.document().text_content(by_id(&engine, "s")), "new");
    }
}
