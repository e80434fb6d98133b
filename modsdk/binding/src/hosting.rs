use api::HostRuntime;
use common::SdkConfig;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::hooks::ModContext;
use crate::loader::ContentLoader;
use crate::resolver::MemberResolver;
use crate::BindingError;

static BINDING: OnceCell<Binding> = OnceCell::new();

/// Process-wide resolver and loader for the attached host.
pub struct Binding {
    context: ModContext,
    resolver: Arc<MemberResolver>,
    loader: Arc<ContentLoader>,
}

impl Binding {
    pub fn new(host: Arc<dyn HostRuntime>, config: &SdkConfig) -> Self {
        let resolver = Arc::new(MemberResolver::new(host, &config.resolver));
        let loader = Arc::new(ContentLoader::new(resolver.clone(), config.loader.clone()));
        Self {
            context: ModContext::new(resolver.clone(), loader.clone()),
            resolver,
            loader,
        }
    }

    pub fn resolver(&self) -> &MemberResolver {
        &self.resolver
    }

    pub fn loader(&self) -> &ContentLoader {
        &self.loader
    }

    pub fn context(&self) -> ModContext {
        self.context.clone()
    }
}

/// Attach the host runtime (call once at startup)
pub fn attach_host(host: Arc<dyn HostRuntime>, config: &SdkConfig) -> Result<&'static Binding, BindingError> {
    BINDING
        .set(Binding::new(host, config))
        .map_err(|_| BindingError::HostAlreadyAttached)?;
    BINDING.get().ok_or(BindingError::HostNotAttached)
}

pub fn binding() -> Option<&'static Binding> {
    BINDING.get()
}
