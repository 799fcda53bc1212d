//! Two views kept in sync through persisted cells.
//!
//! This example shows:
//! - A root cell restored from the settings file on launch
//! - A follower cell mirroring it live in a second view
//! - Views re-rendering when their cells change
//!
//! Click the square for a random colour, open the picker and choose one.
//! The colour is still there on the next launch.

use gpui::*;
use persisted_signals::prelude::*;
use rand::Rng;

const PALETTE: [Colour; 8] = [
    Colour::from_rgb(0xff, 0x00, 0x00),
    Colour::from_rgb(0xff, 0x88, 0x00),
    Colour::from_rgb(0xff, 0xdd, 0x00),
    Colour::from_rgb(0x22, 0xbb, 0x44),
    Colour::from_rgb(0x00, 0x99, 0xdd),
    Colour::from_rgb(0x33, 0x44, 0xcc),
    Colour::from_rgb(0x99, 0x33, 0xcc),
    Colour::from_rgb(0x22, 0x22, 0x22),
];

struct Swatch {
    colour: PersistentCell<Colour>,
}

impl Swatch {
    fn new(cx: &mut Context<Self>) -> Self {
        let colour = cx
            .create_cell("widgetColor", Colour::RED)
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring stored colour");
                let store = cx.settings_store();
                store.remove("widgetColor");
                cx.create_cell("widgetColor", Colour::RED)
                    .expect("a fresh cell always converts its own value")
            });
        Self { colour }
    }

    fn randomize(&mut self) {
        let mut rng = rand::thread_rng();
        self.colour.assign(Colour::from_rgb(rng.gen(), rng.gen(), rng.gen()));
    }
}

impl Render for Swatch {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        div()
            .id("swatch")
            .w(px(30.0))
            .h(px(30.0))
            .p_1()
            .bg(rgb(0x000000))
            .child(div().size_full().bg(rgba(self.colour.read().to_rgba_u32())))
            .on_click(cx.listener(|this, _, _, _| this.randomize()))
    }
}

struct ColourPicker {
    colour: PersistentCell<Colour>,
    swatch: Entity<Swatch>,
}

impl ColourPicker {
    fn new(swatch: Entity<Swatch>, cx: &mut Context<Self>) -> Self {
        let colour = PersistentCell::follow(&swatch.read(cx).colour, "csColour")
            .expect("a colour always converts to a colour");
        cx.observe_cell(&colour);
        Self { colour, swatch }
    }

    fn pick(&mut self, colour: Colour, cx: &mut Context<Self>) {
        self.swatch.update(cx, |swatch, _| {
            swatch.colour.assign(colour);
        });
    }
}

impl Render for ColourPicker {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let current = self.colour.read();

        div()
            .flex()
            .flex_col()
            .gap_3()
            .p_4()
            .bg(rgb(0x1d1d1d))
            .rounded_lg()
            .child(
                div()
                    .h(px(60.0))
                    .rounded_md()
                    .bg(rgba(current.to_rgba_u32())),
            )
            .child(div().text_sm().child(format!("#{current}")))
            .child(
                div()
                    .flex()
                    .flex_wrap()
                    .gap_2()
                    .children(PALETTE.iter().enumerate().map(|(index, colour)| {
                        let colour = *colour;
                        div()
                            .id(("palette", index))
                            .w(px(28.0))
                            .h(px(28.0))
                            .rounded_md()
                            .border_1()
                            .border_color(if colour == current {
                                rgb(0xffffff)
                            } else {
                                rgb(0x444444)
                            })
                            .bg(rgba(colour.to_rgba_u32()))
                            .on_click(cx.listener(move |this, _, _, cx| this.pick(colour, cx)))
                    })),
            )
    }
}

struct MainView {
    swatch: Entity<Swatch>,
    picker: Option<Entity<ColourPicker>>,
}

impl MainView {
    fn new(cx: &mut Context<Self>) -> Self {
        Self {
            swatch: cx.new(Swatch::new),
            picker: None,
        }
    }

    fn toggle_picker(&mut self, cx: &mut Context<Self>) {
        self.picker = match self.picker.take() {
            Some(_) => None,
            None => {
                let swatch = self.swatch.clone();
                Some(cx.new(|cx| ColourPicker::new(swatch, cx)))
            }
        };
        cx.notify();
    }
}

impl Render for MainView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let label = if self.picker.is_some() {
            "Hide Colour Picker"
        } else {
            "Show Colour Picker"
        };

        div()
            .flex()
            .gap_6()
            .p_4()
            .size_full()
            .bg(rgb(0xffffff))
            .text_color(rgb(0xffffff))
            .child(
                div()
                    .flex()
                    .flex_col()
                    .gap_3()
                    .child(self.swatch.clone())
                    .child(
                        div()
                            .id("toggle-picker")
                            .bg(rgb(0x3a3a3a))
                            .rounded_md()
                            .px_4()
                            .py_2()
                            .text_sm()
                            .font_weight(FontWeight::BOLD)
                            .child(label)
                            .on_click(cx.listener(|this, _, _, cx| this.toggle_picker(cx))),
                    ),
            )
            .children(self.picker.clone())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Application::new().run(|cx: &mut App| {
        let store = SettingsStore::open(&StoreOptions::new("ColourSync", "PersistedSignals"));
        if let Some(path) = store.path() {
            tracing::info!(path = %path.display(), "using settings file");
        }
        cx.init_settings_store(store);

        let bounds = Bounds::centered(None, Size::new(px(600.0), px(400.0)), cx);
        cx.open_window(
            WindowOptions {
                window_bounds: Some(WindowBounds::Windowed(bounds)),
                ..Default::default()
            },
            |_window, cx| cx.new(MainView::new),
        )
        .unwrap();
        cx.activate(true);
    });
}
