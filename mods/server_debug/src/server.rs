use anyhow::Result;
use api::{FieldHandle, ModLogger, PropertyHandle, TypeHandle, Value};
use binding::{HookTarget, Mod, ModContext};

/// Logs once the first time the game ticks as a server.
pub struct ServerDebug {
    debug: bool,
    logged: bool,
    logger: Option<ModLogger>,
    server: Option<TypeHandle>,
    is_server_property: Option<PropertyHandle>,
    is_server_field: Option<FieldHandle>,
}

impl ServerDebug {
    pub fn new() -> Self {
        Self {
            debug: true,
            logged: false,
            logger: None,
            server: None,
            is_server_property: None,
            is_server_field: None,
        }
    }

    pub fn has_logged(&self) -> bool {
        self.logged
    }

    fn ensure(&mut self, ctx: &ModContext) {
        let resolver = ctx.resolver();
        if self.server.is_none() {
            self.server = resolver.resolve_type("Server");
        }
        let Some(server) = &self.server else {
            return;
        };
        if self.is_server_property.is_none() {
            self.is_server_property = resolver.property(server, "IsServer");
        }
        if self.is_server_field.is_none() {
            self.is_server_field = resolver.field(server, "IsServer");
        }
    }

    /// Static `IsServer`, read as a property when there is one. Faults read as false.
    fn is_server(&self) -> bool {
        let value = if let Some(property) = &self.is_server_property {
            property.get(None)
        } else if let Some(field) = &self.is_server_field {
            field.get(None)
        } else {
            return false;
        };
        value.ok().and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

impl Default for ServerDebug {
    fn default() -> Self {
        Self::new()
    }
}

impl Mod for ServerDebug {
    fn name(&self) -> &str {
        "ServerDebug"
    }

    fn target(&self) -> HookTarget {
        HookTarget::parameterless("Server:Update")
    }

    fn initialize(&mut self, logger: ModLogger) -> Result<()> {
        self.logger = Some(logger);
        Ok(())
    }

    fn postfix(&mut self, _instance: &Value, ctx: &ModContext) -> Result<()> {
        if self.logged {
            return Ok(());
        }
        self.ensure(ctx);
        if !self.is_server() {
            return Ok(());
        }
        self.logged = true;
        if self.debug {
            if let Some(logger) = &self.logger {
                logger.info("Server mod initialized (Update hook)");
            }
        }
        Ok(())
    }
}
