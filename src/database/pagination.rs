use serde::Serialize;

use crate::{
    constants::MAX_PAGE_SIZE,
    error::{Error, HtmlError, TypeError},
    form::Form,
};

/// Page number pagination requested through `?page=` and `?limit=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn from_form(form: &Form, default_limit: i64) -> Result<Self, TypeError> {
        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        let limit = form.get_number::<i64>("limit")?.unwrap_or(default_limit);

        if page < 1 {
            return Err(TypeError::new("Invalid page."));
        }
        if limit < 1 {
            return Err(TypeError::new("Invalid limit."));
        }

        let limit = limit.min(MAX_PAGE_SIZE);
        // The end of the page has to fit in an i64 OFFSET.
        if page.checked_mul(limit).is_none() {
            return Err(TypeError::new("Invalid page."));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// `path` and `form` describe the current request and are used to build
    /// the neighbouring page links.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        request: PageRequest,
        path: &str,
        form: &Form,
    ) -> Result<Self, Error> {
        if rows.is_empty() && request.page > 1 {
            return Err(HtmlError::NotFound.new("Invalid page."));
        }

        let link = |page: i64| format!("{path}?{}", form.with_value("page", &page.to_string()));

        let next = (request.offset() + (rows.len() as i64) < total_rows)
            .then(|| link(request.page + 1));
        let previous = (request.page > 1).then(|| link(request.page - 1));

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::from_data(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn first_page_links_forward_only() {
        let form = form(&[("limit", "2")]);
        let request = PageRequest::from_form(&form, 6).unwrap();
        assert_eq!(request, PageRequest { page: 1, limit: 2 });

        let page = PageContext::from_rows(vec![1, 2], 5, request, "/api/recipes/", &form).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.next.as_deref(), Some("/api/recipes/?limit=2&page=2"));
        assert_eq!(page.previous, None);
    }

    #[test]
    fn last_page_links_backward_only() {
        let form = form(&[("page", "3"), ("limit", "2")]);
        let request = PageRequest::from_form(&form, 6).unwrap();
        assert_eq!(request.offset(), 4);

        let page = PageContext::from_rows(vec![5], 5, request, "/api/recipes/", &form).unwrap();
        assert_eq!(page.next, None);
        assert_eq!(page.previous.as_deref(), Some("/api/recipes/?limit=2&page=2"));
    }

    #[test]
    fn out_of_range_page_is_not_found() {
        let form = form(&[("page", "9")]);
        let request = PageRequest::from_form(&form, 6).unwrap();
        let result = PageContext::<i32>::from_rows(vec![], 3, request, "/api/users/", &form);
        assert_eq!(result.unwrap_err().code, warp::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn empty_first_page_is_fine() {
        let form = Form::default();
        let request = PageRequest::from_form(&form, 6).unwrap();
        let page = PageContext::<i32>::from_rows(vec![], 0, request, "/api/users/", &form).unwrap();
        assert_eq!(page.count, 0);
        assert!(page.next.is_none() && page.previous.is_none());
    }

    #[test]
    fn limit_is_capped_and_validated() {
        let request = PageRequest::from_form(&form(&[("limit", "1000")]), 6).unwrap();
        assert_eq!(request.limit, MAX_PAGE_SIZE);
        assert!(PageRequest::from_form(&form(&[("page", "0")]), 6).is_err());
        assert!(PageRequest::from_form(&form(&[("limit", "x")]), 6).is_err());
    }

    #[test]
    fn huge_pages_are_refused() {
        let huge = i64::MAX.to_string();
        assert!(PageRequest::from_form(&form(&[("page", &huge)]), 6).is_err());

        let largest = (i64::MAX / MAX_PAGE_SIZE).to_string();
        let request =
            PageRequest::from_form(&form(&[("page", &largest), ("limit", "1000")]), 6).unwrap();
        assert!(request.offset() > 0);
    }
}
