use colored::*;
use refract_core::{
    ClientConnectError, ReflectedDescriptor, ReflectionResolveError,
    reflection::client::ExtensionNumbers,
};

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<ClientConnectError> for FormattedString {
    fn from(err: ClientConnectError) -> Self {
        FormattedString(format!("{}\n\n'{}'", "Connection Error:".red().bold(), err))
    }
}

impl From<ReflectionResolveError> for FormattedString {
    fn from(err: ReflectionResolveError) -> Self {
        let title = match err {
            ReflectionResolveError::SymbolNotFound(_) => "Symbol Lookup Failed:",
            ReflectionResolveError::NegotiationFailed { .. }
            | ReflectionResolveError::NegotiationAborted(_)
            | ReflectionResolveError::ConnectivityTimeout { .. } => "Reflection Unavailable:",
            _ => "Reflection Failed:",
        };

        FormattedString(format!("{}\n\n'{}'", title.red().bold(), err))
    }
}

impl From<std::io::Error> for FormattedString {
    fn from(err: std::io::Error) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Failed to write file:".red().bold(),
            err
        ))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<&ReflectedDescriptor> for FormattedString {
    fn from(descriptor: &ReflectedDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!("Resolved {} file(s):\n", descriptor.len()));

        for file in descriptor.files() {
            out.push_str(&format!("  - {}", file.name().green()));
            if !file.dependencies().is_empty() {
                let deps = file.dependencies().join(", ");
                out.push_str(&format!(" {} {}", "imports".cyan(), deps.yellow()));
            }
            out.push('\n');
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<ExtensionNumbers> for FormattedString {
    fn from(extensions: ExtensionNumbers) -> Self {
        if extensions.numbers.is_empty() {
            return FormattedString(format!(
                "{} {}",
                "No extensions found for".yellow(),
                extensions.base_type_name
            ));
        }

        let numbers: Vec<String> = extensions.numbers.iter().map(i32::to_string).collect();

        FormattedString(format!(
            "{} {}:\n  {}",
            "Extensions of".cyan(),
            extensions.base_type_name.green(),
            numbers.join(", ").purple()
        ))
    }
}
