use serde::Serialize;

use crate::selection::Repaint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    Normal,
    Selected,
    Faded,
}

fn emphasis_for(name: &str, selected: Option<&str>) -> Emphasis {
    match selected {
        None => Emphasis::Normal,
        Some(s) if s == name => Emphasis::Selected,
        Some(_) => Emphasis::Faded,
    }
}

/// Map marks keyed by the entity name they were joined on.
#[derive(Debug, Default)]
pub struct MapView {
    keys: Vec<String>,
    emphasis: Vec<Emphasis>,
    repaints: usize,
}

impl MapView {
    /// `keys` holds one join key per drawn feature (unmatched features use
    /// their own name).
    pub fn load(&mut self, keys: Vec<String>) {
        self.emphasis = vec![Emphasis::Normal; keys.len()];
        self.keys = keys;
    }

    pub fn emphasis(&self) -> &[Emphasis] {
        &self.emphasis
    }

    pub fn repaints(&self) -> usize {
        self.repaints
    }
}

impl Repaint for MapView {
    fn repaint(&mut self, selected: Option<&str>) {
        self.repaints += 1;
        self.emphasis = self.keys.iter().map(|k| emphasis_for(k, selected)).collect();
    }
}

/// Ranked bars, one per entity name.
#[derive(Debug, Default)]
pub struct RankingView {
    names: Vec<String>,
    emphasis: Vec<Emphasis>,
}

impl RankingView {
    pub fn load(&mut self, names: Vec<String>) {
        self.emphasis = vec![Emphasis::Normal; names.len()];
        self.names = names;
    }

    pub fn emphasis(&self) -> &[Emphasis] {
        &self.emphasis
    }
}

impl Repaint for RankingView {
    fn repaint(&mut self, selected: Option<&str>) {
        self.emphasis = self.names.iter().map(|n| emphasis_for(n, selected)).collect();
    }
}
