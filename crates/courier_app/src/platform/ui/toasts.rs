use std::collections::VecDeque;

use eframe::egui::{self, RichText};

use super::constants::TOAST_AREA_ID;

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub body: String,
    shown_at: f64,
}

/// Short-lived notifications, oldest first. Times are egui input seconds.
#[derive(Debug)]
pub struct Toasts {
    items: VecDeque<Toast>,
    lifetime: f64,
    capacity: usize,
}

impl Toasts {
    pub fn new(lifetime: f64, capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            lifetime,
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, title: impl Into<String>, body: impl Into<String>, now: f64) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(Toast {
            title: title.into(),
            body: body.into(),
            shown_at: now,
        });
    }

    pub fn expire(&mut self, now: f64) {
        let lifetime = self.lifetime;
        self.items.retain(|toast| now - toast.shown_at < lifetime);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.items.iter()
    }

    pub fn show(&self, ctx: &egui::Context) {
        if self.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new(TOAST_AREA_ID))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-12.0, -12.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for toast in self.iter() {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.label(RichText::new(&toast.title).strong());
                        ui.label(&toast.body);
                    });
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn titles(toasts: &Toasts) -> Vec<&str> {
        toasts.iter().map(|toast| toast.title.as_str()).collect()
    }

    #[test]
    fn toasts_expire_after_their_lifetime() {
        let mut toasts = Toasts::new(4.0, 4);
        toasts.push("Archive", "3 files archived", 1.0);
        toasts.push("Done", "runpodctl receive abcd", 3.0);

        toasts.expire(4.5);
        assert_eq!(titles(&toasts), vec!["Archive", "Done"]);
        toasts.expire(5.0);
        assert_eq!(titles(&toasts), vec!["Done"]);
        toasts.expire(7.0);
        assert!(toasts.is_empty());
    }

    #[test]
    fn oldest_toast_makes_room() {
        let mut toasts = Toasts::new(4.0, 2);
        toasts.push("one", "", 0.0);
        toasts.push("two", "", 0.0);
        toasts.push("three", "", 0.0);
        assert_eq!(titles(&toasts), vec!["two", "three"]);
    }
}
