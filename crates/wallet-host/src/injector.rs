use bridge_core::Injection;

/// Handle on the page's script context.
pub trait ScriptInjector: Send + Sync {
    /// Evaluates `script` in the page.
    fn inject_javascript(&self, script: &str);

    /// Delivers a bridge answer to the page's provider.
    fn deliver(&self, injection: Injection) {
        self.inject_javascript(&injection.to_script());
    }
}
