//! Intrusive doubly-linked lists over a [`Slab`].
//!
//! A list arena is a tightly packed container of doubly-linked lists
//! of a single element type. Lists and their elements are identified
//! by small non-negative integer ids — indexes into the underlying
//! slab. Adding a list or element may move other elements in memory,
//! but never changes their id.
//!
//! Each list also has a past-the-end id: the id of the list itself,
//! which denotes the position just after the list's last element.
//! Every element in the arena belongs to exactly one list at a time;
//! `move_element_before` can relocate an element to a different list.
//!
//! Removing a list removes all of its member elements; removing an
//! element does not require knowing which list it is on.
//!
//! Ported from `original_source/cuti/cuti/list_arena.hpp`.

use crate::slab::Slab;

enum NodeKind<T> {
    /// A list head: a node with no payload whose `prev`/`next` point
    /// at itself when the list is empty.
    Head,
    Element(T),
}

struct Node<T> {
    prev: i32,
    next: i32,
    kind: NodeKind<T>,
}

/// A slab of doubly-linked list nodes, as specified in spec.md §4.2.
pub struct ListArena<T> {
    nodes: Slab<Node<T>>,
}

impl<T> Default for ListArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListArena<T> {
    pub fn new() -> Self {
        ListArena { nodes: Slab::new() }
    }

    /// Creates a new empty list, returning its id.
    pub fn add_list(&mut self) -> i32 {
        self.nodes.insert_with(|id| Node {
            prev: id,
            next: id,
            kind: NodeKind::Head,
        })
    }

    /// Inserts `value` before `before` on `before`'s list, returning
    /// the new element's id. `before` may be the past-the-end id of a
    /// list.
    pub fn add_element_before(&mut self, before: i32, value: T) -> i32 {
        let prev = self.nodes.get(before).prev;
        let next = before;
        let element = self.nodes.insert(Node {
            prev,
            next,
            kind: NodeKind::Element(value),
        });
        self.nodes.get_mut(prev).next = element;
        self.nodes.get_mut(next).prev = element;
        element
    }

    /// Relocates `element`, possibly to a different list, before
    /// `before`. `element` must not be the past-the-end id of its
    /// list.
    pub fn move_element_before(&mut self, before: i32, element: i32) {
        debug_assert!(self.is_element(element));

        let old_prev = self.nodes.get(element).prev;
        let old_next = self.nodes.get(element).next;
        self.nodes.get_mut(old_prev).next = old_next;
        self.nodes.get_mut(old_next).prev = old_prev;

        let new_prev = self.nodes.get(before).prev;
        let new_next = self.nodes.get(new_prev).next; // != before when element == before
        self.nodes.get_mut(new_prev).next = element;
        {
            let node = self.nodes.get_mut(element);
            node.prev = new_prev;
            node.next = new_next;
        }
        self.nodes.get_mut(new_next).prev = element;
    }

    /// Unlinks and recycles `element`. `element` must be a data node,
    /// not a list head.
    pub fn remove_element(&mut self, element: i32) {
        debug_assert!(self.is_element(element));
        let (prev, next) = {
            let node = self.nodes.get(element);
            (node.prev, node.next)
        };
        self.nodes.get_mut(prev).next = next;
        self.nodes.get_mut(next).prev = prev;
        self.nodes.remove(element);
    }

    /// Recycles `list` and every data node on it.
    pub fn remove_list(&mut self, list: i32) {
        debug_assert!(self.is_list(list));
        let mut element = self.first(list);
        while element != self.last(list) {
            let next = self.next(element);
            self.nodes.remove(element);
            element = next;
        }
        self.nodes.remove(list);
    }

    /// `list`'s first element id, or its past-the-end id if empty.
    pub fn first(&self, list: i32) -> i32 {
        self.nodes.get(list).next
    }

    /// `list`'s past-the-end id (does not denote an actual element).
    pub fn last(&self, list: i32) -> i32 {
        list
    }

    /// `element`'s next element id; `element` must not be the
    /// past-the-end id of its list.
    pub fn next(&self, element: i32) -> i32 {
        self.nodes.get(element).next
    }

    /// `element`'s previous element id; `element` must not be the
    /// first element id of its list.
    pub fn prev(&self, element: i32) -> i32 {
        self.nodes.get(element).prev
    }

    pub fn value(&self, element: i32) -> &T {
        match &self.nodes.get(element).kind {
            NodeKind::Element(value) => value,
            NodeKind::Head => panic!("ListArena::value: {element} is a list head"),
        }
    }

    pub fn value_mut(&mut self, element: i32) -> &mut T {
        match &mut self.nodes.get_mut(element).kind {
            NodeKind::Element(value) => value,
            NodeKind::Head => panic!("ListArena::value_mut: {element} is a list head"),
        }
    }

    pub fn list_empty(&self, list: i32) -> bool {
        self.first(list) == self.last(list)
    }

    fn is_element(&self, id: i32) -> bool {
        self.nodes.contains(id) && matches!(self.nodes.get(id).kind, NodeKind::Element(_))
    }

    fn is_list(&self, id: i32) -> bool {
        self.nodes.contains(id) && matches!(self.nodes.get(id).kind, NodeKind::Head)
    }

    /// Iterates `list`'s elements from `first` to `last`.
    pub fn iter(&self, list: i32) -> ListIter<'_, T> {
        ListIter {
            arena: self,
            list,
            cursor: self.first(list),
        }
    }
}

pub struct ListIter<'a, T> {
    arena: &'a ListArena<T>,
    list: i32,
    cursor: i32,
}

impl<'a, T> Iterator for ListIter<'a, T> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        if self.cursor == self.arena.last(self.list) {
            None
        } else {
            let id = self.cursor;
            self.cursor = self.arena.next(id);
            Some(id)
        }
    }
}
