//! eframe window: the display panel with "Toggle Replay" and "New Point"
//! buttons underneath and a one-line status.
//!
//! The window only polls the `DisplayPanel` and sends commands. It never
//! touches the camera, the cache or the replay file.

use anyhow::{anyhow, Result};
use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions, Vec2};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::controller::StreamStatus;
use crate::frame::DisplayImage;
use crate::render::DisplayPanel;
use crate::scheduler::CommandSender;

const REPAINT_INTERVAL: Duration = Duration::from_millis(30);

pub struct ReplayApp {
    panel: DisplayPanel,
    commands: CommandSender,
    quit: Arc<AtomicBool>,
    texture: Option<TextureHandle>,
}

impl ReplayApp {
    pub fn new(panel: DisplayPanel, commands: CommandSender, quit: Arc<AtomicBool>) -> Self {
        Self {
            panel,
            commands,
            quit,
            texture: None,
        }
    }

    fn upload(&mut self, ctx: &egui::Context) {
        let Some(image) = self.panel.current() else {
            return;
        };
        let color = to_color_image(image);
        match self.texture.as_mut() {
            Some(texture) => texture.set(color, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("sblive-frame", color, TextureOptions::LINEAR))
            }
        }
    }

    fn status_line(status: &StreamStatus) -> egui::RichText {
        let text = egui::RichText::new(status.to_string()).monospace();
        if status.is_healthy() {
            text
        } else {
            text.color(egui::Color32::from_rgb(220, 80, 60))
        }
    }
}

fn to_color_image(image: &DisplayImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied(
        [image.width() as usize, image.height() as usize],
        image.as_rgba(),
    )
}

impl eframe::App for ReplayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.quit.load(Ordering::SeqCst) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        if self.panel.poll() {
            self.upload(ctx);
        }

        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Toggle Replay").clicked() {
                    self.commands.toggle_replay();
                }
                if ui.button("New Point").clicked() {
                    self.commands.new_point();
                }
                ui.separator();
                ui.label(Self::status_line(self.panel.status()));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match &self.texture {
            Some(texture) => {
                let size = texture.size_vec2();
                let available = ui.available_size();
                let scale = (available.x / size.x).min(available.y / size.y).max(0.0);
                ui.centered_and_justified(|ui| {
                    ui.add(egui::Image::new(egui::load::SizedTexture::new(
                        texture.id(),
                        size * scale,
                    )));
                });
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label("Waiting for video...");
                });
            }
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

/// Open the window and block until it is closed or `quit` is raised.
pub fn run(
    title: &str,
    size: (u32, u32),
    panel: DisplayPanel,
    commands: CommandSender,
    quit: Arc<AtomicBool>,
) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title)
            .with_inner_size(Vec2::new(size.0 as f32, size.1 as f32 + 48.0)),
        ..Default::default()
    };
    let app = ReplayApp::new(panel, commands, quit);
    eframe::run_native(title, options, Box::new(move |_cc| Ok(Box::new(app))))
        .map_err(|err| anyhow!("window failed: {}", err))
}
