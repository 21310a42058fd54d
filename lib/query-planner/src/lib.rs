pub mod ast;
pub mod planner;
pub mod printer;
pub mod routing;
pub mod schema;

#[cfg(test)]
mod tests;

pub fn parse_schema(
    sdl: &str,
) -> Result<graphql_parser::schema::Document<'static, String>, graphql_parser::schema::ParseError>
{
    Ok(graphql_parser::parse_schema(sdl)?.into_static())
}

pub fn parse_operation(
    operation: &str,
) -> Result<graphql_parser::query::Document<'static, String>, graphql_parser::query::ParseError> {
    Ok(graphql_parser::parse_query(operation)?.into_static())
}
