/// Per-run step/action history.
///
/// Every round contributes exactly one step slot and one action slot, even
/// when extraction found neither, so the two sequences can never diverge in
/// length. The single `push` entry point is what enforces that.
#[derive(Debug, Clone, Default)]
pub struct RoundHistory {
    steps: Vec<String>,
    actions: Vec<String>,
}

impl RoundHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Option<String>, action: Option<String>) {
        self.steps.push(step.unwrap_or_default());
        self.actions.push(action.unwrap_or_default());
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Model-facing rendering: a 0-based `index. step<TAB>action` line per
    /// prior round under a fixed header.
    pub fn render(&self) -> String {
        let mut out = String::from("\nHistory steps: ");
        for (index, (step, action)) in self.steps.iter().zip(&self.actions).enumerate() {
            out.push_str(&format!("\n{index}. {step}\t{action}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_and_actions_stay_parallel() {
        let mut history = RoundHistory::new();
        history.push(Some("tap(x=1)".into()), Some("press".into()));
        history.push(None, Some("scroll".into()));
        history.push(Some("type(text=a)".into()), None);
        history.push(None, None);
        assert_eq!(history.steps().len(), history.actions().len());
        assert_eq!(history.len(), 4);
        assert_eq!(history.steps()[1], "");
        assert_eq!(history.actions()[2], "");
    }

    #[test]
    fn render_is_zero_indexed_and_tab_separated() {
        let mut history = RoundHistory::new();
        history.push(Some("tap(x=1)".into()), Some("press button".into()));
        history.push(Some("scroll(d=down)".into()), Some("scroll page".into()));
        assert_eq!(
            history.render(),
            "\nHistory steps: \n0. tap(x=1)\tpress button\n1. scroll(d=down)\tscroll page"
        );
    }

    #[test]
    fn empty_history_renders_header_only() {
        assert_eq!(RoundHistory::new().render(), "\nHistory steps: ");
        assert!(RoundHistory::new().is_empty());
    }
}
