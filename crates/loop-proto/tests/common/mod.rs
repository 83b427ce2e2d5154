pub mod devicestatus;
