use chrono::{DateTime, Utc};
use eframe::egui::{self, Color32, RichText};

use crate::common::Message;
use crate::ui::format::{initials, relative_time, role_label};
use crate::ui::state::AppState;

const ACCENT: Color32 = Color32::from_rgb(59, 130, 246);
const ADMIN_ACCENT: Color32 = Color32::from_rgb(245, 158, 11);

#[derive(Default)]
pub struct ChatAreaActions {
    pub load_more: bool,
    pub delete_id: Option<String>,
}

pub fn render(ui: &mut egui::Ui, state: &AppState, now: DateTime<Utc>) -> ChatAreaActions {
    let mut actions = ChatAreaActions::default();
    let snapshot = &state.snapshot;

    if snapshot.loading {
        ui.label(RichText::new("Cargando mensajes...").weak());
        return actions;
    }

    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .auto_shrink([false; 2])
        .max_height(ui.available_height() - 48.0)
        .show(ui, |ui| {
            if !snapshot.messages.is_empty() && snapshot.has_more_history {
                ui.vertical_centered(|ui| {
                    let button = egui::Button::new("Cargar mensajes anteriores");
                    if ui.add_enabled(!state.loading_more, button).clicked() {
                        actions.load_more = true;
                    }
                });
            }

            if snapshot.messages.is_empty() {
                ui.label(RichText::new("Todavía no hay mensajes. ¡Escribe el primero!").weak());
            }

            for message in &snapshot.messages {
                if let Some(id) = render_message(ui, state, message, now) {
                    actions.delete_id = Some(id);
                }
            }
        });

    actions
}

fn render_message(
    ui: &mut egui::Ui,
    state: &AppState,
    message: &Message,
    now: DateTime<Utc>,
) -> Option<String> {
    let own = state.is_own(message);
    let layout = if own {
        egui::Layout::right_to_left(egui::Align::TOP)
    } else {
        egui::Layout::left_to_right(egui::Align::TOP)
    };

    let mut delete = None;
    ui.with_layout(layout, |ui| {
        if !own {
            ui.label(
                RichText::new(initials(&message.author))
                    .strong()
                    .color(Color32::WHITE)
                    .background_color(ACCENT),
            );
        }

        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.vertical(|ui| {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(&message.author).strong());
                    let badge_color = if message.is_privileged {
                        ADMIN_ACCENT
                    } else {
                        ACCENT
                    };
                    ui.label(
                        RichText::new(role_label(message.is_privileged))
                            .small()
                            .color(badge_color),
                    );
                    if state.can_delete()
                        && ui
                            .small_button("🗑")
                            .on_hover_text("Eliminar mensaje")
                            .clicked()
                    {
                        delete = Some(message.id.clone());
                    }
                });
                ui.label(&message.text);
                ui.label(RichText::new(relative_time(now, message.timestamp)).small().weak());
            });
        });
    });
    ui.add_space(4.0);

    delete
}
