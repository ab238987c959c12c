use std::sync::Arc;

use super::defer;
use crate::config::EngineConfig;
use crate::driver::{Driver, Row};
use crate::error::{EntError, Result};
use crate::graph;
use crate::load::{LoadPlan, load_edges, source_fk_columns};
use crate::node::{FromValue, Node};
use crate::pagination::{Connection, Cursor, PageArgs};
use crate::schema::EntitySchema;
use crate::spec::QuerySpec;
use crate::sql::{Aggregate, Order, Predicate, Selector};
use crate::value::Id;

/// Builder for reading nodes of one entity.
pub struct QueryBuilder {
    driver: Arc<dyn Driver>,
    config: Arc<EngineConfig>,
    schema: &'static EntitySchema,
    spec: QuerySpec,
    plans: Vec<LoadPlan>,
    error: Option<EntError>,
}

impl QueryBuilder {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        config: Arc<EngineConfig>,
        schema: &'static EntitySchema,
    ) -> Self {
        Self {
            driver,
            config,
            schema,
            spec: QuerySpec::new(schema.node_spec()),
            plans: Vec::new(),
            error: None,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// The `QuerySpec` built so far.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Add a predicate; repeated filters are conjoined.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.spec.add_predicate(predicate);
        self
    }

    pub fn where_id(mut self, id: impl Into<Id>) -> Self {
        let id = id.into();
        match self.schema.check_id(&id) {
            Ok(()) => self.spec.add_predicate(Predicate::eq(self.schema.id.column, &id)),
            Err(err) => defer(&mut self.error, err),
        }
        self
    }

    /// Keep nodes with at least one `edge` neighbor.
    pub fn where_has_edge(self, edge: &str) -> Self {
        let predicate = Predicate::has_edge(self.schema, edge);
        self.filter_with(predicate)
    }

    /// Keep nodes with an `edge` neighbor matching `target`.
    pub fn where_has_edge_with(self, edge: &str, target: Predicate) -> Self {
        let predicate = Predicate::has_edge_with(self.schema, edge, target);
        self.filter_with(predicate)
    }

    fn filter_with(mut self, predicate: Result<Predicate>) -> Self {
        match predicate {
            Ok(predicate) => self.filter(predicate),
            Err(err) => {
                defer(&mut self.error, err);
                self
            }
        }
    }

    pub fn order(mut self, order: Order) -> Self {
        if self.schema.has_column(&order.column) {
            self.spec.order.push(order);
        } else {
            let err = EntError::validation(
                &order.column,
                format!("unknown order column on {}", self.schema.label),
            );
            defer(&mut self.error, err);
        }
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    /// Return each node at most once.
    pub fn unique(mut self, unique: bool) -> Self {
        self.spec.unique = unique;
        self
    }

    /// Eager-load `edge` on every returned node. `configure` shapes the
    /// query over the edge's targets and may request further loads.
    pub fn with_edge(mut self, edge: &str, configure: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let def = match self.schema.require_edge(edge) {
            Ok(def) => def,
            Err(err) => {
                defer(&mut self.error, err);
                return self;
            }
        };
        let nested = configure(QueryBuilder::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.config),
            def.target,
        ));
        if let Some(err) = nested.error {
            defer(&mut self.error, err);
            return self;
        }

        self.plans.retain(|p| p.edge.name != def.name);
        self.plans.push(LoadPlan {
            edge: def,
            spec: nested.spec,
            nested: nested.plans,
        });
        self
    }

    /// Query the `edge` neighbors of the nodes this query matches.
    pub fn query_edge(self, edge: &str) -> Result<QueryBuilder> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let def = self.schema.require_edge(edge)?;
        let source = graph::query_selector(&self.spec);
        let predicate = graph::neighbors(source, self.schema.id.column, &def.spec(Vec::new()));

        let mut target = QueryBuilder::new(self.driver, self.config, def.target);
        target.spec.add_predicate(predicate);
        target.spec.unique = true;
        Ok(target)
    }

    fn check(&mut self) -> Result<()> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Every matching node, with requested edges loaded.
    pub async fn all(mut self) -> Result<Vec<Node>> {
        self.check()?;
        let driver = self.driver.as_ref();

        let mut spec = self.spec;
        for fk in source_fk_columns(&self.plans) {
            if !spec.node.columns.contains(&fk) {
                spec.node.columns.push(fk);
            }
        }
        let rows = graph::query_nodes(driver, &spec).await?;
        let mut nodes = rows
            .into_iter()
            .map(|row| Node::from_row(self.schema, row))
            .collect::<Result<Vec<_>>>()?;
        load_edges(driver, &mut nodes, &self.plans).await?;
        Ok(nodes)
    }

    /// Ids of every matching node.
    pub async fn ids(mut self) -> Result<Vec<Id>> {
        self.check()?;
        let id = &self.spec.node.id;
        let mut selector = graph::query_selector(&self.spec);
        selector.columns = vec![id.column.clone()];
        let rows = graph::select_rows(self.driver.as_ref(), &selector).await?;
        graph::ids_from_rows(&rows, id.ty, &id.column)
    }

    /// The first matching node, if any.
    pub async fn first(self) -> Result<Option<Node>> {
        Ok(self.limit(1).all().await?.into_iter().next())
    }

    pub async fn first_id(self) -> Result<Option<Id>> {
        Ok(self.limit(1).ids().await?.into_iter().next())
    }

    /// The single matching node. Zero matches is `NotFound`, more than one
    /// is `NotSingular`.
    pub async fn only(self) -> Result<Node> {
        let label = self.schema.label;
        singular(label, self.limit(2).all().await?)
    }

    pub async fn only_id(self) -> Result<Id> {
        let label = self.schema.label;
        singular(label, self.limit(2).ids().await?)
    }

    /// Number of matching nodes; limit and offset are ignored.
    pub async fn count(mut self) -> Result<i64> {
        self.check()?;
        graph::count_nodes(self.driver.as_ref(), &self.spec).await
    }

    pub async fn exist(self) -> Result<bool> {
        Ok(self.first_id().await?.is_some())
    }

    // ========================================================================
    // Pagination
    // ========================================================================

    /// One Relay page ordered by id. Without `first` or `last` every node
    /// after the cursors is returned.
    pub async fn paginate(
        self,
        after: Option<Cursor>,
        first: Option<i32>,
        before: Option<Cursor>,
        last: Option<i32>,
    ) -> Result<Connection<Node>> {
        self.page(PageArgs::new(after, first, before, last)).await
    }

    /// Like [`paginate`](Self::paginate), with the configured default page
    /// size and `first`/`last` clamped to the configured maximum.
    pub async fn paginate_with_default(
        self,
        after: Option<Cursor>,
        first: Option<i32>,
        before: Option<Cursor>,
        last: Option<i32>,
    ) -> Result<Connection<Node>> {
        let args = PageArgs::new(after, first, before, last)
            .with_page_size(self.config.default_page_size, self.config.max_page_size);
        self.page(args).await
    }

    async fn page(mut self, args: PageArgs) -> Result<Connection<Node>> {
        args.validate()?;
        self.check()?;
        if args.is_empty_page() {
            return Ok(Connection::empty());
        }
        args.bound(&mut self.spec)?;
        let entity = self.schema.label;
        let nodes = self.all().await?;

        tracing::debug!(entity, fetched = nodes.len(), "Fetched page");
        Ok(args.wrap(nodes, Node::cursor))
    }

    // ========================================================================
    // Projections
    // ========================================================================

    /// Project the given columns instead of whole nodes.
    pub fn select<S: AsRef<str>>(self, columns: impl IntoIterator<Item = S>) -> SelectBuilder {
        let columns: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        SelectBuilder::new(self, columns, false)
    }

    /// Group by the given columns; add aggregates on the returned builder.
    pub fn group_by<S: AsRef<str>>(self, columns: impl IntoIterator<Item = S>) -> SelectBuilder {
        let columns: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        SelectBuilder::new(self, columns, true)
    }
}

fn singular<T>(label: &str, mut items: Vec<T>) -> Result<T> {
    match items.len() {
        0 => Err(EntError::not_found(label)),
        1 => Ok(items.remove(0)),
        _ => Err(EntError::not_singular(label)),
    }
}

/// A column projection, optionally grouped and aggregated.
pub struct SelectBuilder {
    query: QueryBuilder,
    columns: Vec<String>,
    grouped: bool,
    aggregates: Vec<Aggregate>,
}

impl SelectBuilder {
    fn new(mut query: QueryBuilder, columns: Vec<String>, grouped: bool) -> Self {
        if let Some(unknown) = columns.iter().find(|c| !query.schema.has_column(c)) {
            let err = EntError::validation(
                unknown,
                format!("unknown column on {}", query.schema.label),
            );
            defer(&mut query.error, err);
        }
        Self {
            query,
            columns,
            grouped,
            aggregates: Vec::new(),
        }
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        let column = match &aggregate {
            Aggregate::Count => None,
            Aggregate::Sum(c) | Aggregate::Avg(c) | Aggregate::Min(c) | Aggregate::Max(c) => Some(c),
        };
        if let Some(column) = column.filter(|c| !self.query.schema.has_column(c)) {
            let err = EntError::validation(column, "unknown aggregate column");
            defer(&mut self.query.error, err);
        }
        self.aggregates.push(aggregate);
        self
    }

    fn selector(&self) -> Selector {
        let mut selector = graph::query_selector(&self.query.spec);
        selector.columns = self.columns.clone();
        selector.aggregates = self.aggregates.clone();
        if self.grouped {
            selector.group_by = self.columns.clone();
        }
        selector
    }

    /// Raw rows; aggregates appear under [`Aggregate::alias`].
    pub async fn rows(mut self) -> Result<Vec<Row>> {
        self.query.check()?;
        let selector = self.selector();
        graph::select_rows(self.query.driver.as_ref(), &selector).await
    }

    /// Values of a single-column projection.
    pub async fn scalars<T: FromValue>(self) -> Result<Vec<T>> {
        let width = self.columns.len() + self.aggregates.len();
        if width != 1 {
            return Err(EntError::validation(
                self.columns.first().map(String::as_str).unwrap_or_default(),
                format!("scalar read needs exactly one column, got {}", width),
            ));
        }
        let rows = self.rows().await?;
        rows.iter()
            .map(|row| {
                let value = row.values.first().cloned().unwrap_or_default();
                T::from_value(&value).ok_or_else(|| EntError::Decode {
                    column: row.columns.first().cloned().unwrap_or_default(),
                    message: format!(
                        "cannot convert {} to {}",
                        value.kind(),
                        std::any::type_name::<T>()
                    ),
                })
            })
            .collect()
    }

    pub async fn strings(self) -> Result<Vec<String>> {
        self.scalars().await
    }

    pub async fn ints(self) -> Result<Vec<i64>> {
        self.scalars().await
    }

    pub async fn floats(self) -> Result<Vec<f64>> {
        self.scalars().await
    }

    pub async fn bools(self) -> Result<Vec<bool>> {
        self.scalars().await
    }
}
