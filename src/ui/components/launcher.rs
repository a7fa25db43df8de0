use eframe::egui;

/// Toggle button with the unread badge. Returns true when clicked.
pub fn render(ui: &mut egui::Ui, is_open: bool, unread: Option<u64>) -> bool {
    let mut clicked = false;
    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
        let label = if is_open { "✕ Cerrar" } else { "💬 Chat" };
        if ui.button(label).clicked() {
            clicked = true;
        }

        if let Some(count) = unread {
            ui.label(
                egui::RichText::new(format!(" {count} "))
                    .strong()
                    .color(egui::Color32::WHITE)
                    .background_color(egui::Color32::RED),
            );
        }
    });
    clicked
}
