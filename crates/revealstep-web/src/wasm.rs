#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use js_sys::{Array, Function, Reflect};
use revealstep_core::logging::LoggingError;
use revealstep_core::step::{Action, StepDescriptor};
use revealstep_core::style::container_overflow;
use revealstep_core::{
    ContainerId, EmbedRequest, Engine, EngineConfig, FragmentRef, HostEvent, PresentationHost,
    SlideIndex, SlideLayout, SurfaceAdapter, SurfaceError, SurfaceTicket,
};
use tracing::Level;
use tracing_subscriber::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, Element, HtmlIFrameElement, KeyboardEvent, Request, RequestInit, Response};

use crate::logging::{ConsoleLayer, ConsoleSink};
use crate::markup::{self, Placement, RawBackward, RawIndex};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = Reveal, js_name = addEventListener)]
    fn reveal_add_event_listener(event: &str, callback: &Function);

    #[wasm_bindgen(js_namespace = Reveal, js_name = removeEventListener)]
    fn reveal_remove_event_listener(event: &str, callback: &Function);

    #[wasm_bindgen(js_namespace = Reveal, js_name = isReady)]
    fn reveal_is_ready() -> bool;

    #[wasm_bindgen(js_namespace = Reveal, js_name = getConfig)]
    fn reveal_get_config() -> JsValue;

    #[wasm_bindgen(js_namespace = Reveal, js_name = getIndices)]
    fn reveal_current_indices() -> JsValue;

    #[wasm_bindgen(js_namespace = Reveal, js_name = getIndices)]
    fn reveal_indices_of(slide: &Element) -> JsValue;

    #[wasm_bindgen(js_namespace = Reveal, js_name = getSlide)]
    fn reveal_get_slide(h: u32, v: u32) -> Option<Element>;

    #[wasm_bindgen(js_namespace = Reveal, js_name = getSlideBackground)]
    fn reveal_get_slide_background(h: u32, v: u32) -> Option<Element>;

    #[wasm_bindgen(js_namespace = Reveal, js_name = getHorizontalSlides)]
    fn reveal_get_horizontal_slides() -> Array;

    #[wasm_bindgen(js_namespace = Reveal, js_name = triggerKey)]
    fn reveal_trigger_key(key_code: u32);

    #[wasm_bindgen(js_namespace = Reveal, js_name = layout)]
    fn reveal_layout();
}

const NAVIGATION_EVENTS: [&str; 6] = [
    "ready",
    "slidechanged",
    "overviewshown",
    "overviewhidden",
    "fragmentshown",
    "fragmenthidden",
];

type WebEngine = Engine<RevealHost, DomSurfaces>;

struct Shared {
    engine: WebEngine,
    started: web_time::Instant,
    timer: Option<i32>,
    scanned: bool,
}

type SharedRef = Weak<RefCell<Shared>>;

/// Run `f` against the engine, then flush deferred host work.
///
/// Calls made while the engine is already borrowed (a visualization
/// navigating the deck from inside a transition) are dropped.
fn drive<R>(weak: &SharedRef, f: impl FnOnce(&mut Shared) -> R) -> Option<R> {
    let rc = weak.upgrade()?;
    let (result, keys) = {
        let Ok(mut shared) = rc.try_borrow_mut() else {
            tracing::warn!("engine busy, dropping re-entrant call");
            return None;
        };
        let elapsed = shared.started.elapsed();
        shared.engine.set_time(elapsed);
        let result = f(&mut shared);
        shared.schedule_deadline(weak);
        let keys = std::mem::take(&mut shared.engine.host_mut().pending_keys);
        (result, keys)
    };
    for key in keys {
        reveal_trigger_key(key);
    }
    Some(result)
}

impl Shared {
    fn schedule_deadline(&mut self, weak: &SharedRef) {
        let Some(window) = web_sys::window() else {
            return;
        };
        if let Some(handle) = self.timer.take() {
            window.clear_timeout_with_handle(handle);
        }
        let Some(deadline) = self.engine.next_deadline() else {
            return;
        };
        let delay = deadline.saturating_sub(self.engine.now());
        let weak = weak.clone();
        let callback = Closure::once_into_js(move || {
            drive(&weak, |_| ());
        });
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        match window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.unchecked_ref(),
            millis,
        ) {
            Ok(handle) => self.timer = Some(handle),
            Err(err) => tracing::warn!(error = ?err, "failed to schedule arrival timer"),
        }
    }

    /// Discover visualization containers and register them with the engine.
    fn scan_deck(&mut self) {
        if self.scanned {
            return;
        }
        self.scanned = true;
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let containers = document.get_elements_by_class_name(markup::CONTAINER_CLASS);
        let mut layouts: BTreeMap<SlideIndex, SlideLayout> = BTreeMap::new();

        for i in 0..containers.length() {
            let Some(element) = containers.item(i) else {
                continue;
            };
            let is_section = element.tag_name().eq_ignore_ascii_case("section");
            let slide = if is_section {
                Some(element.clone())
            } else {
                element.closest("section").ok().flatten()
            };
            let Some(slide) = slide else {
                tracing::warn!("visualization container outside of any slide");
                continue;
            };
            let index = indices(&reveal_indices_of(&slide));
            let placement = markup::placement(
                is_section,
                element.has_attribute(markup::ATTR_NO_BACKGROUND),
            );
            let mount = match placement {
                Placement::Foreground => Some(element.clone()),
                Placement::Background => reveal_get_slide_background(index.h, index.v)
                    .and_then(|bg| bg.query_selector(".slide-background-content").ok().flatten()),
            };
            let Some(mount) = mount else {
                tracing::warn!(slide = %index, "slide background layer not found");
                continue;
            };

            let surfaces = self.engine.surfaces_mut();
            let id = ContainerId(surfaces.slots.len() as u32);
            let Some(spec) = markup::container_spec(id, |name| element.get_attribute(name)) else {
                continue;
            };
            surfaces.slots.push(Slot {
                container: element,
                mount,
            });

            let layout = layouts
                .entry(index)
                .or_insert_with(|| SlideLayout::new(index).with_authored(authored_markers(&slide)));
            match placement {
                Placement::Foreground => layout.foreground.push(spec),
                Placement::Background => layout.background = Some(spec),
            }
        }

        tracing::debug!(slides = layouts.len(), "scanned deck");
        for layout in layouts.into_values() {
            self.engine.register_slide(layout);
        }
    }
}

fn authored_markers(slide: &Element) -> Vec<u32> {
    let Ok(fragments) = slide.query_selector_all(".fragment") else {
        return Vec::new();
    };
    let mut values = Vec::new();
    for i in 0..fragments.length() {
        let Some(fragment) = fragments.item(i).and_then(|n| n.dyn_into::<Element>().ok()) else {
            continue;
        };
        if fragment.class_list().contains(markup::STEP_MARKER_CLASS) {
            continue;
        }
        values.push(fragment.get_attribute(markup::ATTR_FRAGMENT_INDEX));
    }
    markup::authored_markers(values.iter().map(Option::as_deref))
}

fn indices(value: &JsValue) -> SlideIndex {
    let read = |key: &str| {
        Reflect::get(value, &JsValue::from_str(key))
            .ok()
            .and_then(|v| v.as_f64())
            .map_or(0, |n| n as u32)
    };
    SlideIndex::new(read("h"), read("v"))
}

fn current_slide() -> SlideIndex {
    indices(&reveal_current_indices())
}

fn host_event(kind: &str, event: &JsValue) -> Option<HostEvent> {
    let current = current_slide();
    match kind {
        "ready" => Some(HostEvent::Ready { current }),
        "slidechanged" => {
            let previous = Reflect::get(event, &JsValue::from_str("previousSlide"))
                .ok()
                .and_then(|v| v.dyn_into::<Element>().ok())
                .map(|slide| indices(&reveal_indices_of(&slide)));
            Some(HostEvent::SlideChanged { previous, current })
        }
        "overviewshown" => Some(HostEvent::OverviewShown { current }),
        "overviewhidden" => Some(HostEvent::OverviewHidden { current }),
        "fragmentshown" | "fragmenthidden" => {
            let fragments = fragment_refs(event);
            let slide = Reflect::get(event, &JsValue::from_str("fragment"))
                .ok()
                .and_then(|v| v.dyn_into::<Element>().ok())
                .and_then(|f| f.closest("section").ok().flatten())
                .map_or(current, |s| indices(&reveal_indices_of(&s)));
            Some(if kind == "fragmentshown" {
                HostEvent::FragmentShown { slide, fragments }
            } else {
                HostEvent::FragmentHidden { slide, fragments }
            })
        }
        _ => None,
    }
}

fn fragment_refs(event: &JsValue) -> Vec<FragmentRef> {
    let Ok(list) = Reflect::get(event, &JsValue::from_str("fragments")) else {
        return Vec::new();
    };
    Array::from(&list)
        .iter()
        .filter_map(|v| v.dyn_into::<Element>().ok())
        .filter_map(|fragment| {
            let marker = fragment
                .get_attribute(markup::ATTR_FRAGMENT_INDEX)
                .as_deref()
                .and_then(markup::fragment_index)?;
            Some(FragmentRef {
                marker,
                synthetic: fragment.class_list().contains(markup::STEP_MARKER_CLASS),
            })
        })
        .collect()
}

fn engine_config() -> EngineConfig {
    let json = js_sys::JSON::stringify(&reveal_get_config())
        .ok()
        .and_then(|s| s.as_string())
        .unwrap_or_default();
    let (config, errors) = EngineConfig::from_json_lenient(&json);
    for err in &errors {
        tracing::warn!(error = %err, "ignoring configuration value");
    }
    config
}

/// Presentation host backed by the global `Reveal` object.
#[derive(Default)]
struct RevealHost {
    /// Keys to forward once the engine is released; triggering a key may
    /// navigate and re-enter the engine.
    pending_keys: Vec<u32>,
}

impl PresentationHost for RevealHost {
    fn total_horizontal_slides(&self) -> u32 {
        reveal_get_horizontal_slides().length()
    }

    fn insert_step_markers(&mut self, slide: SlideIndex, markers: &[u32]) {
        let Some(section) = reveal_get_slide(slide.h, slide.v) else {
            tracing::warn!(%slide, "slide not found for step markers");
            return;
        };
        let Some(document) = section.owner_document() else {
            return;
        };
        for &marker in markers {
            if let Err(err) = append_marker(&document, &section, marker) {
                tracing::warn!(%slide, marker, error = ?err, "failed to insert step marker");
            }
        }
    }

    fn sync_layout(&mut self) {
        reveal_layout();
    }

    fn forward_key(&mut self, key_code: u32) {
        self.pending_keys.push(key_code);
    }
}

fn append_marker(document: &Document, section: &Element, marker: u32) -> Result<(), JsValue> {
    let span = document.create_element("span")?;
    span.set_attribute("class", &format!("fragment {}", markup::STEP_MARKER_CLASS))?;
    span.set_attribute(markup::ATTR_FRAGMENT_INDEX, &marker.to_string())?;
    section.append_child(&span)?;
    Ok(())
}

struct Slot {
    /// Element carrying the authoring attributes.
    container: Element,
    /// Element the surface is appended to.
    mount: Element,
}

struct Frame {
    element: HtmlIFrameElement,
    _onload: Closure<dyn FnMut()>,
}

/// Surface adapter creating sandboxed iframes.
struct DomSurfaces {
    shared: SharedRef,
    slots: Vec<Slot>,
    frames: HashMap<ContainerId, Frame>,
}

impl DomSurfaces {
    fn new(shared: SharedRef) -> Self {
        Self {
            shared,
            slots: Vec::new(),
            frames: HashMap::new(),
        }
    }

    fn slot(&self, container: ContainerId) -> Result<&Slot, SurfaceError> {
        self.slots
            .get(container.0 as usize)
            .ok_or(SurfaceError::MissingContainer(container))
    }
}

fn dom_error(err: JsValue) -> SurfaceError {
    SurfaceError::Dom(format!("{err:?}"))
}

impl SurfaceAdapter for DomSurfaces {
    fn embed(&mut self, request: &EmbedRequest) -> Result<(), SurfaceError> {
        let slot = self.slot(request.container)?;
        if let Some(container) = slot.container.dyn_ref::<web_sys::HtmlElement>() {
            let style = container.style();
            let current = style.get_property_value("overflow").ok();
            if let Some(overflow) = container_overflow(current.as_deref(), request.overflow_shown) {
                style.set_property("overflow", overflow).map_err(dom_error)?;
            }
        }

        let document = slot
            .mount
            .owner_document()
            .ok_or_else(|| SurfaceError::Dom("container is detached".into()))?;
        let frame: HtmlIFrameElement = document
            .create_element("iframe")
            .map_err(dom_error)?
            .dyn_into()
            .map_err(|_| SurfaceError::Dom("iframe element has unexpected type".into()))?;

        let mut attributes = vec![
            ("class", request.class.to_owned()),
            ("sandbox", request.sandbox.to_owned()),
            ("style", request.style.to_css()),
            ("scrolling", request.scrolling.clone()),
            ("src", request.src.clone()),
        ];
        if request.is_background {
            attributes.extend([
                ("allowfullscreen", String::new()),
                ("width", "100%".to_owned()),
                ("height", "100%".to_owned()),
            ]);
        }
        for (name, value) in &attributes {
            frame.set_attribute(name, value).map_err(dom_error)?;
        }

        let onload = on_load(self.shared.clone(), request.ticket, frame.clone());
        frame.set_onload(Some(onload.as_ref().unchecked_ref()));
        slot.mount.append_child(&frame).map_err(dom_error)?;
        self.frames.insert(
            request.container,
            Frame {
                element: frame,
                _onload: onload,
            },
        );
        Ok(())
    }

    fn remove(&mut self, container: ContainerId) {
        if let Some(frame) = self.frames.remove(&container) {
            frame.element.set_onload(None);
            frame.element.remove();
        }
    }

    fn has_surface(&self, container: ContainerId) -> bool {
        self.slots
            .get(container.0 as usize)
            .and_then(|slot| slot.mount.query_selector("iframe").ok().flatten())
            .is_some()
    }

    fn probe(&mut self, ticket: SurfaceTicket, url: &str) {
        let weak = self.shared.clone();
        let url = url.to_owned();
        wasm_bindgen_futures::spawn_local(async move {
            let exists = resource_exists(&url).await;
            drive(&weak, |shared| shared.engine.probe_resolved(ticket, exists));
        });
    }
}

async fn resource_exists(url: &str) -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };
    let init = RequestInit::new();
    init.set_method("HEAD");
    let Ok(request) = Request::new_with_str_and_init(url, &init) else {
        return false;
    };
    match JsFuture::from(window.fetch_with_request(&request)).await {
        Ok(value) => value
            .dyn_into::<Response>()
            .is_ok_and(|r| r.ok() && r.status() == 200),
        Err(err) => {
            tracing::debug!(%url, error = ?err, "existence check failed");
            false
        }
    }
}

fn on_load(weak: SharedRef, ticket: SurfaceTicket, frame: HtmlIFrameElement) -> Closure<dyn FnMut()> {
    let key_listener: Rc<RefCell<Option<Closure<dyn FnMut(KeyboardEvent)>>>> = Rc::default();
    Closure::new(move || {
        let Some(window) = frame.content_window() else {
            tracing::warn!(surface = %ticket.surface, "loaded surface has no window");
            return;
        };

        let listener_weak = weak.clone();
        let listener = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            let key_code = event.key_code();
            drive(&listener_weak, |shared| shared.engine.forward_key(key_code));
        });
        if let Err(err) =
            window.add_event_listener_with_callback("keydown", listener.as_ref().unchecked_ref())
        {
            tracing::debug!(error = ?err, "cannot listen for keys inside surface");
        }
        *key_listener.borrow_mut() = Some(listener);

        let transitions = Reflect::get(&window, &JsValue::from_str(markup::TRANSITIONS_PROPERTY))
            .unwrap_or(JsValue::UNDEFINED);
        let steps = descriptors(&transitions);
        drive(&weak, |shared| shared.engine.surface_loaded(ticket, steps));
    })
}

fn descriptors(transitions: &JsValue) -> Vec<StepDescriptor> {
    if !Array::is_array(transitions) {
        return Vec::new();
    }
    Array::from(transitions)
        .iter()
        .map(|step| {
            let get = |key: &str| Reflect::get(&step, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED);
            let index = get("index");
            let raw_index = if let Some(n) = index.as_f64() {
                RawIndex::Number(n)
            } else if let Some(text) = index.as_string() {
                RawIndex::Text(text)
            } else {
                RawIndex::Missing
            };
            let forward = get("transitionForward")
                .dyn_into::<Function>()
                .map_or_else(|_| Action::noop(), js_action);
            let backward = get("transitionBackward");
            let raw_backward = if let Some(text) = backward.as_string() {
                RawBackward::Text(text)
            } else if let Ok(f) = backward.dyn_into::<Function>() {
                RawBackward::Callable(js_action(f))
            } else {
                RawBackward::Missing
            };
            StepDescriptor::new(forward)
                .with_index(markup::step_index(raw_index))
                .with_backward(markup::backward(raw_backward))
        })
        .collect()
}

fn js_action(f: Function) -> Action {
    Action::new(move || {
        if let Err(err) = f.call0(&JsValue::NULL) {
            tracing::warn!(error = ?err, "visualization transition threw");
        }
    })
}

/// Writes formatted events to the devtools console.
struct BrowserConsole;

impl ConsoleSink for BrowserConsole {
    fn write_line(&self, level: Level, line: &str) {
        let line = JsValue::from_str(line);
        match level {
            Level::ERROR => web_sys::console::error_1(&line),
            Level::WARN => web_sys::console::warn_1(&line),
            Level::INFO => web_sys::console::info_1(&line),
            Level::DEBUG | Level::TRACE => web_sys::console::debug_1(&line),
        }
    }
}

/// Route engine logs to the browser console at `level` and above.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: Option<String>) -> Result<(), JsValue> {
    let filter = match level.as_deref() {
        Some(level) => level
            .parse::<tracing_subscriber::filter::LevelFilter>()
            .map_err(|e| JsValue::from_str(&LoggingError::Filter(e.to_string()).to_string()))?,
        None => tracing_subscriber::filter::LevelFilter::WARN,
    };
    tracing_subscriber::registry()
        .with(ConsoleLayer::new(BrowserConsole).with_filter(filter))
        .try_init()
        .map_err(|_| JsValue::from_str(&LoggingError::AlreadyInstalled.to_string()))
}

/// reveal.js plugin instance.
#[wasm_bindgen]
pub struct RevealStep {
    shared: Rc<RefCell<Shared>>,
    listeners: Vec<(&'static str, Closure<dyn FnMut(JsValue)>)>,
}

#[wasm_bindgen]
impl RevealStep {
    /// Read the deck configuration and subscribe to reveal.js events.
    ///
    /// Call after `Reveal.initialize`; if the deck is already ready the
    /// current slide is handled immediately.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let config = engine_config();
        let shared = Rc::new_cyclic(|weak: &SharedRef| {
            RefCell::new(Shared {
                engine: Engine::new(config, RevealHost::default(), DomSurfaces::new(weak.clone())),
                started: web_time::Instant::now(),
                timer: None,
                scanned: false,
            })
        });

        let mut listeners = Vec::with_capacity(NAVIGATION_EVENTS.len());
        for kind in NAVIGATION_EVENTS {
            let weak = Rc::downgrade(&shared);
            let callback = Closure::<dyn FnMut(JsValue)>::new(move |event: JsValue| {
                let Some(host_event) = host_event(kind, &event) else {
                    return;
                };
                drive(&weak, |shared| {
                    shared.scan_deck();
                    shared.engine.handle_event(host_event)
                });
            });
            reveal_add_event_listener(kind, callback.as_ref().unchecked_ref());
            listeners.push((kind, callback));
        }

        let this = Self { shared, listeners };
        if reveal_is_ready() {
            let weak = Rc::downgrade(&this.shared);
            drive(&weak, |shared| {
                shared.scan_deck();
                shared.engine.handle_event(HostEvent::Ready {
                    current: current_slide(),
                })
            });
        }
        this
    }

    /// Unsubscribe from reveal.js and cancel pending timers.
    pub fn destroy(&mut self) {
        for (kind, callback) in self.listeners.drain(..) {
            reveal_remove_event_listener(kind, callback.as_ref().unchecked_ref());
        }
        if let Ok(mut shared) = self.shared.try_borrow_mut()
            && let Some(handle) = shared.timer.take()
            && let Some(window) = web_sys::window()
        {
            window.clear_timeout_with_handle(handle);
        }
    }
}
