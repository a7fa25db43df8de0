use eframe::egui;

/// Name prompt shown before joining. Returns the chosen display name.
pub fn render(ui: &mut egui::Ui, name_input: &mut String) -> Option<String> {
    let mut submit = false;
    ui.vertical_centered(|ui| {
        ui.heading("Chat en Tiempo Real");
        ui.label(egui::RichText::new("Únete a la conversación con otros estudiantes").weak());
        ui.add_space(12.0);

        let response = ui.add(
            egui::TextEdit::singleline(name_input).hint_text("¿Cómo te llamas?"),
        );
        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            submit = true;
        }
        if ui.button("Ingresar al chat").clicked() {
            submit = true;
        }

        ui.add_space(12.0);
        ui.label(
            egui::RichText::new("Al unirte, aceptas nuestras normas de comunidad")
                .small()
                .weak(),
        );
    });

    let name = name_input.trim();
    if submit && !name.is_empty() {
        let name = name.to_string();
        name_input.clear();
        return Some(name);
    }

    None
}
