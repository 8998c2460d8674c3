mod api;
mod browser;
mod config;
mod controller;
mod error;
mod image;

use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{DragEvent, File};

use crate::api::TryOnClient;
use crate::config::TryOnConfig;
use crate::controller::{Applied, Controller, OnExit};
use crate::error::{TryOnError, describe_js};
use crate::image::{Role, SNIFF_LEN};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Health {
    Checking,
    Online,
    Unreachable,
}

impl Health {
    fn label(self) -> &'static str {
        match self {
            Health::Checking => "Checking service…",
            Health::Online => "Service online",
            Health::Unreachable => "Service unreachable",
        }
    }
}

/// Handles shared by every event handler. Built once in [`App`].
#[derive(Clone, Copy)]
struct TryOnApp {
    state: RwSignal<Controller<File>, LocalStorage>,
    config: StoredValue<TryOnConfig>,
    client: StoredValue<TryOnClient>,
    result_ref: NodeRef<leptos::html::Section>,
    person_input: NodeRef<leptos::html::Input>,
    clothing_input: NodeRef<leptos::html::Input>,
}

impl TryOnApp {
    fn input_ref(self, role: Role) -> NodeRef<leptos::html::Input> {
        match role {
            Role::Person => self.person_input,
            Role::Clothing => self.clothing_input,
        }
    }

    fn arm_dismiss(self, notice: u64) {
        let state = self.state;
        let after = self.config.with_value(|c| c.error_display);
        set_timeout(move || state.update(|c| c.dismiss_error(notice)), after);
    }

    fn surface(self, err: TryOnError) {
        if let Some(notice) = self.state.try_update(|c| c.show_error(err.to_string())) {
            self.arm_dismiss(notice);
        }
    }

    fn reject(self, role: Role, pick: u64, err: TryOnError) {
        if let Some(Some(notice)) = self.state.try_update(|c| c.reject(role, pick, err)) {
            self.arm_dismiss(notice);
        }
    }

    async fn select(self, role: Role, file: File) {
        let Some(pick) = self.state.try_update(|c| c.begin_pick(role)) else {
            return;
        };
        let meta = browser::file_meta(&file);
        let max_bytes = self.config.with_value(|c| c.max_upload_bytes);

        let sniffed = if meta.declared_type_allowed() {
            None
        } else {
            match browser::read_header(&file, SNIFF_LEN).await {
                Ok(header) => image::sniff_mime(&header),
                Err(e) => {
                    tracing::warn!(%role, err = %describe_js(&e), "could not read file header");
                    None
                }
            }
        };

        if let Err(err) = image::validate(&meta, sniffed, max_bytes) {
            tracing::info!(%role, name = %meta.name, mime = %meta.mime, size = meta.size, "rejected selection");
            self.reject(role, pick, err);
            return;
        }

        let mime = image::preview_mime(&meta, sniffed).to_string();
        let committed = self
            .state
            .try_update(|c| c.select(role, pick, file.clone(), meta))
            .unwrap_or(false);
        if !committed {
            return;
        }

        match browser::read_data_url(&file, &mime).await {
            Ok(url) => self.state.update(|c| {
                c.set_preview(role, pick, url);
            }),
            Err(e) => self.reject(
                role,
                pick,
                TryOnError::Read {
                    role,
                    reason: describe_js(&e),
                },
            ),
        }
    }

    async fn submit(self) {
        let submission = match self.state.try_update(|c| c.begin_submit()) {
            Some(Ok(s)) => s,
            Some(Err(err)) => {
                self.surface(err);
                return;
            }
            None => return,
        };
        let generation = submission.generation;
        let state = self.state;
        let _restore = OnExit::new(move || {
            if let Some(Some(notice)) = state.try_update(|c| c.settle(generation)) {
                self.arm_dismiss(notice);
            }
        });

        let client = self.client.get_value();
        let outcome = client
            .virtual_tryon(&submission.person, &submission.clothing)
            .await;
        if let Err(err) = &outcome {
            tracing::error!(generation, %err, "virtual try-on failed");
        }

        match state.try_update(|c| c.complete(generation, outcome)) {
            Some(Applied::Rendered) => self.reveal_result(),
            Some(Applied::Failed(notice)) => self.arm_dismiss(notice),
            _ => {}
        }
    }

    fn reveal_result(self) {
        let result_ref = self.result_ref;
        // wait for the section to be displayed before scrolling
        request_animation_frame(move || {
            if let Some(section) = result_ref.get_untracked() {
                browser::scroll_into_view(&section);
            }
        });
    }

    fn download(self) {
        let target = self
            .state
            .with_untracked(|c| c.download_target().map(str::to_owned));
        let href = match target {
            Ok(href) => href,
            Err(err) => {
                self.surface(err);
                return;
            }
        };
        let filename = image::result_filename(&href, &browser::now_ts());
        if let Err(e) = browser::trigger_download(&href, &filename) {
            tracing::error!(err = %describe_js(&e), "download failed");
            self.surface(TryOnError::SaveFailed);
        }
    }

    fn reset(self) {
        self.state.update(|c| c.reset());
        for role in Role::ALL {
            if let Some(input) = self.input_ref(role).get_untracked() {
                input.set_value("");
            }
        }
        browser::scroll_to_top();
    }
}

#[component]
fn UploadCard(app: TryOnApp, role: Role) -> impl IntoView {
    let input_ref = app.input_ref(role);
    let (dragging, set_dragging) = signal(false);

    let preview = Memo::new(move |_| {
        app.state
            .with(|c| c.slot(role).and_then(|s| s.preview.clone()))
    });
    let caption = Memo::new(move |_| app.state.with(|c| c.slot(role).map(|s| s.meta.caption())));

    let on_change = move |_| {
        let Some(input) = input_ref.get() else { return };
        let Some(files) = input.files() else { return };
        let Some(file) = browser::first_file(&files) else {
            return;
        };
        // reset input so selecting same file again triggers change
        input.set_value("");
        spawn_local(app.select(role, file));
    };

    // drag & drop
    let on_drag_over = move |ev: DragEvent| {
        ev.prevent_default();
        set_dragging.set(true);
    };
    let on_drag_leave = move |_ev: DragEvent| {
        set_dragging.set(false);
    };
    let on_drop = move |ev: DragEvent| {
        ev.prevent_default();
        set_dragging.set(false);
        let Some(dt) = ev.data_transfer() else { return };
        let Some(files) = dt.files() else { return };
        let Some(file) = browser::first_file(&files) else {
            return;
        };
        spawn_local(app.select(role, file));
    };

    view! {
        <div class="upload-card"
            class:dragging=move || dragging.get()
            on:dragover=on_drag_over
            on:dragleave=on_drag_leave
            on:drop=on_drop
        >
            <h2>{role.title()}</h2>
            <label class="upload-area">
                <input node_ref=input_ref type="file" accept="image/*"
                    on:change=on_change
                    style="display:none;"
                />
                {move || match preview.get() {
                    Some(src) => view! { <img class="preview" src=src.to_string() alt=role.title() /> }.into_any(),
                    None => view! { <div class="placeholder">"Click to choose or drop an image"</div> }.into_any(),
                }}
            </label>
            {move || caption.get().map(|text| view! { <p class="caption">{text}</p> })}
        </div>
    }
}

#[component]
fn App() -> impl IntoView {
    let config = browser::window()
        .document()
        .map(|doc| TryOnConfig::from_document(&doc))
        .unwrap_or_default();
    let client = TryOnClient::new(config.endpoint.clone(), config.health_endpoint.clone());

    let app = TryOnApp {
        state: RwSignal::new_local(Controller::new()),
        config: StoredValue::new(config),
        client: StoredValue::new(client),
        result_ref: NodeRef::new(),
        person_input: NodeRef::new(),
        clothing_input: NodeRef::new(),
    };
    let result_ref = app.result_ref;

    let health = RwSignal::new(Health::Checking);
    spawn_local(async move {
        let status = match app.client.get_value().health().await {
            Ok(h) if h.is_healthy() => {
                tracing::info!(service = ?h.service, "service online");
                Health::Online
            }
            Ok(h) => {
                tracing::warn!(status = %h.status, "service reports unhealthy");
                Health::Unreachable
            }
            Err(err) => {
                tracing::warn!(%err, "health check failed");
                Health::Unreachable
            }
        };
        health.set(status);
    });

    // Derived view state
    let can_submit = Memo::new(move |_| app.state.with(|c| c.can_submit()));
    let loading = Memo::new(move |_| app.state.with(|c| c.is_loading()));
    let phase = Memo::new(move |_| app.state.with(|c| c.submission().as_str()));
    let error = Memo::new(move |_| app.state.with(|c| c.error().map(|n| n.message.clone())));
    let result = Memo::new(move |_| app.state.with(|c| c.shared_result()));

    let on_submit = move |_| spawn_local(app.submit());
    let on_dismiss = move |_| app.state.update(|c| c.hide_error());
    let on_download = move |_| app.download();
    let on_reset = move |_| app.reset();

    view! {
        <div class="main" data-phase=move || phase.get()>
            <header class="topbar">
                <h1>"Virtual Try-On"</h1>
                <span class="status-badge">{move || health.get().label()}</span>
            </header>

            <div class="upload-grid">
                <UploadCard app=app role=Role::Person />
                <UploadCard app=app role=Role::Clothing />
            </div>

            <button class="try-on-btn"
                class:disabled=move || !can_submit.get()
                prop:disabled=move || !can_submit.get()
                on:click=on_submit
            >
                <span class="button-text" style:display=move || if loading.get() { "none" } else { "inline-block" }>
                    "Try it on"
                </span>
                <span class="loading-spinner" style:display=move || if loading.get() { "inline-block" } else { "none" }></span>
            </button>

            <div class="error-message" style:display=move || if error.get().is_some() { "block" } else { "none" }>
                <span class="error-text">{move || error.get().unwrap_or_default()}</span>
                <button class="error-close" on:click=on_dismiss>"×"</button>
            </div>

            <section node_ref=result_ref class="result-section"
                style:display=move || if result.get().is_some() { "block" } else { "none" }
            >
                <h2>"Result"</h2>
                <img class="result-image" alt="Try-on result"
                    src=move || result.get().map(|r| r.to_string()).unwrap_or_default()
                />
                <div class="result-actions">
                    <button on:click=on_download>"Download"</button>
                    <button on:click=on_reset>"Try again"</button>
                </div>
            </section>
        </div>
    }
}

fn main() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    mount_to_body(|| view! { <App /> });
}
