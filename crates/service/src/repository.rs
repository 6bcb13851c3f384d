//! Repositories as served over HTTP: a content facet (hosted or proxy) or
//! a group of member repositories.

use std::fmt;
use std::sync::Arc;

use common::facet::maven::{MavenGroupFacet, MavenPath};
use common::facet::{ContentFacet, FacetError};
use common::partial::PartialFetchHandler;
use common::view::{content_response, failure, responses, Request, Response, StorageHandler};
use http::{Method, StatusCode};
use tracing::{debug, warn};

use crate::config::{RepositoryFormat, RepositoryKind};

const MAVEN_METADATA: &str = "maven-metadata.xml";

#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub facet: Arc<dyn ContentFacet>,
}

#[derive(Debug)]
pub enum Backend {
    /// Hosted or proxy storage
    Content(Arc<dyn ContentFacet>),
    Group {
        members: Vec<Member>,
        /// Merged `maven-metadata.xml` cache for Maven groups
        metadata: Option<MavenGroupFacet>,
    },
}

pub struct Repository {
    name: String,
    format: RepositoryFormat,
    kind: RepositoryKind,
    backend: Backend,
    partial: PartialFetchHandler,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(
        name: impl Into<String>,
        format: RepositoryFormat,
        kind: RepositoryKind,
        backend: Backend,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            kind,
            backend,
            partial: PartialFetchHandler::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> RepositoryFormat {
        self.format
    }

    pub fn kind(&self) -> RepositoryKind {
        self.kind
    }

    /// Content facet of a hosted or proxy repository.
    pub fn content_facet(&self) -> Option<Arc<dyn ContentFacet>> {
        match &self.backend {
            Backend::Content(facet) => Some(facet.clone()),
            Backend::Group { .. } => None,
        }
    }

    pub async fn handle(&self, request: &Request) -> Response {
        let response = match &self.backend {
            Backend::Content(facet) => StorageHandler.handle(facet.as_ref(), request).await,
            Backend::Group { members, metadata } => {
                self.handle_group(members, metadata.as_ref(), request).await
            }
        };
        self.partial.apply(request, response)
    }

    async fn handle_group(
        &self,
        members: &[Member],
        metadata: Option<&MavenGroupFacet>,
        request: &Request,
    ) -> Response {
        if !matches!(*request.method(), Method::GET | Method::HEAD) {
            return responses::method_not_allowed(request.method(), &[Method::GET, Method::HEAD]);
        }

        if let Some(metadata) = metadata {
            let maven_path = MavenPath::parse(request.path());
            if maven_path.main().file_name() == MAVEN_METADATA {
                return self
                    .group_metadata(members, metadata, &maven_path, request)
                    .await;
            }
        }

        for member in members {
            let response = StorageHandler.handle(member.facet.as_ref(), request).await;
            if response.status() == StatusCode::OK {
                debug!(group = %self.name, member = %member.name, path = request.path(), "served by member");
                return response;
            }
            if response.status().is_server_error() {
                warn!(group = %self.name, member = %member.name, status = %response.status(), "member failed");
            }
        }
        responses::not_found(request.path())
    }

    /// Merge the members' metadata for `path` (or its checksum) and serve
    /// it from the group cache. Falls back to the last cached copy when no
    /// member answers.
    async fn group_metadata(
        &self,
        members: &[Member],
        metadata: &MavenGroupFacet,
        path: &MavenPath,
        request: &Request,
    ) -> Response {
        let main = path.main();
        let get = Request::get(main.path());
        let mut member_responses = Vec::with_capacity(members.len());
        for member in members {
            let response = StorageHandler.handle(member.facet.as_ref(), &get).await;
            member_responses.push((member.name.clone(), response));
        }

        if let Err(e) = metadata
            .merge_and_cache_metadata(main.path(), member_responses)
            .await
        {
            return self.metadata_failure(request, &e);
        }

        match metadata.cached_merged_metadata(path.path()).await {
            Ok(Some(content)) => content_response(content),
            Ok(None) => responses::not_found(request.path()),
            Err(e) => self.metadata_failure(request, &e),
        }
    }

    fn metadata_failure(&self, request: &Request, e: &FacetError) -> Response {
        warn!(group = %self.name, path = request.path(), error = %e, "group metadata failed");
        failure(request, e)
    }
}
