use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{ChatCommand, ChatEvent, Session};
use crate::config;

use super::components::{chat_area, entrance, input_bar, launcher};
use super::state::AppState;

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<ChatCommand>,
    event_receiver: mpsc::Receiver<ChatEvent>,
    config_path: String,
}

impl ChatApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<ChatCommand>,
        event_receiver: mpsc::Receiver<ChatEvent>,
        session: Session,
        dark_mode: bool,
        config_path: String,
    ) -> Self {
        let visuals = if dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        cc.egui_ctx.set_visuals(visuals);

        Self {
            state: AppState::new(session),
            command_sender,
            event_receiver,
            config_path,
        }
    }

    fn handle_chat_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply_event(event);
        }
    }

    fn send_command(&mut self, command: ChatCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to chat worker: {err}");
        }
    }

    fn send_message(&mut self, text: String) {
        let command = ChatCommand::SendMessage {
            text,
            author: self.state.session.display_name.clone(),
            is_privileged: self.state.session.is_privileged,
        };
        self.send_command(command);
    }

    fn render_chat(&mut self, ui: &mut egui::Ui) {
        ui.heading("Chat en tiempo real");
        ui.separator();

        if !self.state.session.is_signed_in() {
            if let Some(name) = entrance::render(ui, &mut self.state.name_input) {
                if let Some(name) = self.state.sign_in(&name) {
                    config::persist_display_name(&self.config_path, &name);
                }
            }
            return;
        }

        let mut dismiss = false;
        if let Some(notice) = &self.state.notice {
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::RED, notice);
                dismiss = ui.small_button("OK").clicked();
            });
        }
        if dismiss {
            self.state.notice = None;
        }

        let actions = chat_area::render(ui, &self.state, chrono::Utc::now());
        if actions.load_more && self.state.request_load_more() {
            self.send_command(ChatCommand::LoadMore);
        }
        if let Some(id) = actions.delete_id {
            if self.state.can_delete() {
                self.send_command(ChatCommand::DeleteMessage(id));
            }
        }

        ui.separator();
        if let Some(content) = input_bar::render(ui, &mut self.state.input_text) {
            self.send_message(content);
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_chat_events();

        egui::TopBottomPanel::bottom("chat_launcher").show(ctx, |ui| {
            let badge = self.state.unread_badge();
            if launcher::render(ui, self.state.is_open, badge) {
                let open = self.state.toggle_open();
                self.send_command(ChatCommand::SetOpen(open));
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.state.is_open {
                self.render_chat(ui);
            } else {
                ui.vertical_centered(|ui| {
                    ui.heading("MiSemestre");
                    ui.label(egui::RichText::new("Abre el chat para hablar con otros estudiantes").weak());
                });
            }
        });

        ctx.request_repaint();
    }
}
